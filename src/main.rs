use std::io::Cursor;
use std::num::ParseIntError;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::ConsoleOutputHandler;
use termcolor::ColorChoice;
use tracing_subscriber::EnvFilter;

use bootimg_pack::{EntryType, Error, Format, Header, HeaderFields, Writer};

#[derive(Parser)]
#[command(version, author, about = "Program for packing Android boot images.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Packs a boot image from its payload files.
    Pack(PackArgs),
    /// Prints the default header fields of the formats.
    Defaults(DefaultsArgs),
}

#[derive(Args)]
struct PackArgs {
    /// The boot image format to produce.
    ///
    /// Supported formats are 'android', 'bump', 'loki', 'mtk' and
    /// 'sonyelf'.
    #[arg(
        short = 't',
        long = "type",
        value_name = "FORMAT",
        default_value = "android"
    )]
    format: Format,

    /// The boot image to create, for example 'boot.img'.
    ///
    /// If this file already exists it will be emptied first.
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    output: PathBuf,

    /// The file to pack the kernel from.
    #[arg(long, value_name = "KERNEL_FILE")]
    kernel: Option<PathBuf>,

    /// The file to pack the ramdisk from.
    #[arg(long, value_name = "RAMDISK_FILE")]
    ramdisk: Option<PathBuf>,

    /// The file to pack the optional second stage bootloader from.
    #[arg(long, value_name = "SECOND_FILE")]
    second: Option<PathBuf>,

    /// The file to pack the device tree from.
    #[arg(long, value_name = "TREE_FILE")]
    dt: Option<PathBuf>,

    /// The aboot bootloader image of the target device.
    ///
    /// Only used by the loki format, which reads the load base out of it
    /// to build the patch record. The aboot image itself is not stored
    /// in the boot image.
    #[arg(long, value_name = "ABOOT_FILE")]
    aboot: Option<PathBuf>,

    /// The file to pack the initial program loader from.
    #[arg(long, value_name = "IPL_FILE")]
    ipl: Option<PathBuf>,

    /// The file to pack the resource power manager firmware from.
    #[arg(long, value_name = "RPM_FILE")]
    rpm: Option<PathBuf>,

    /// The file to pack the applications bootloader from.
    #[arg(long, value_name = "APPSBL_FILE")]
    appsbl: Option<PathBuf>,

    /// The kernel command line to store in the header.
    #[arg(long, value_name = "CMDLINE")]
    cmdline: Option<String>,

    /// The board name to store in the header.
    #[arg(long, value_name = "NAME")]
    board: Option<String>,

    /// Use a custom page size.
    ///
    /// This may be required on some devices. Not every format breaks its
    /// image up in pages.
    #[arg(short, long, value_name = "PAGE_SIZE")]
    page_size: Option<u32>,

    /// Address the kernel should be loaded to.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    kernel_address: Option<u32>,

    /// Address the ramdisk should be loaded to.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    ramdisk_address: Option<u32>,

    /// Address the second stage bootloader should be loaded to.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    second_address: Option<u32>,

    /// Physical address of the kernel tags.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    tags_address: Option<u32>,

    /// Address the initial program loader should be loaded to.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    ipl_address: Option<u32>,

    /// Address the resource power manager firmware should be loaded to.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    rpm_address: Option<u32>,

    /// Address the applications bootloader should be loaded to.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    appsbl_address: Option<u32>,

    /// Address execution should start at.
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    entrypoint: Option<u32>,
}

#[derive(Args)]
struct DefaultsArgs {
    /// The boot image format to describe. All formats when left out.
    #[arg(short = 't', long = "type", value_name = "FORMAT")]
    format: Option<Format>,
}

/// Parses an address given either as '0x'-prefixed hex or as decimal.
fn parse_address(src: &str) -> Result<u32, ParseIntError> {
    match src.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => src.parse(),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let console = ConsoleOutputHandler::new(ColorChoice::Auto);

    match Cli::parse().command {
        Command::Pack(arguments) => main_pack(arguments, console),
        Command::Defaults(arguments) => main_defaults(arguments, console),
    }
}

fn main_pack(arguments: PackArgs, mut console: ConsoleOutputHandler) {
    use std::fs::File;
    use std::io::Read;

    use humansize::{format_size, BINARY};

    let mut writer = Writer::new();
    if let Err(error) = writer.set_format(arguments.format) {
        console.print_fatal_error("Failed to select the boot image format", Some(&error));
    }
    if let Err(error) = writer.open_file(&arguments.output) {
        console.print_fatal_error(
            &format!(
                "Failed to create boot image file '{}'",
                arguments.output.display()
            ),
            Some(&error),
        );
    }

    let header = match writer.get_header() {
        Ok(header) => header,
        Err(error) => {
            console.print_fatal_error("Failed to read the format's defaults", Some(&error))
        }
    };
    let header = apply_overrides(header, &arguments, &mut console);
    if let Err(error) = writer.write_header(&header) {
        console.print_fatal_error("Failed to write the boot image header", Some(&error));
    }
    console.print_status_success("Wrote", "header.");

    loop {
        let entry = match writer.get_entry() {
            Ok(entry) => entry,
            Err(Error::EndOfEntries) => break,
            Err(error) => {
                console.print_fatal_error("Failed to advance to the next entry", Some(&error))
            }
        };
        let Some(input_path) = payload_path(&arguments, entry.entry_type) else {
            continue;
        };

        let mut input_file = match File::open(input_path) {
            Ok(file) => file,
            Err(error) => {
                console.print_fatal_error(
                    &format!("Failed to open '{}'", input_path.display()),
                    Some(&error),
                )
            }
        };
        if let Err(error) = writer.write_entry(&entry) {
            console.print_fatal_error(
                &format!("Failed to start the '{}' entry", entry.entry_type),
                Some(&error),
            );
        }

        let mut buffer = [0; 64 * 1024];
        let mut copied = 0u64;
        loop {
            let count = match input_file.read(&mut buffer) {
                Ok(0) => break,
                Ok(count) => count,
                Err(error) => {
                    console.print_fatal_error(
                        &format!("Failed to read from '{}'", input_path.display()),
                        Some(&error),
                    )
                }
            };
            if let Err(error) = writer.write_data(&buffer[..count]) {
                console.print_fatal_error(
                    &format!("Failed to write the '{}' entry", entry.entry_type),
                    Some(&error),
                );
            }
            copied += count as u64;
        }

        console.print_status_success(
            "Packed",
            &format!(
                "'{}' entry from '{}' ({}).",
                entry.entry_type,
                input_path.display(),
                format_size(copied, BINARY)
            ),
        );
    }

    match writer.close() {
        Ok(()) => {
            console.print_status_success(
                "Created",
                &format!("boot image '{}'.", arguments.output.display()),
            );
        }
        Err(error) => {
            console.print_fatal_error("Failed to finalise the boot image", Some(&error));
        }
    }
}

fn payload_path(arguments: &PackArgs, entry_type: EntryType) -> Option<&PathBuf> {
    match entry_type {
        EntryType::Kernel => arguments.kernel.as_ref(),
        EntryType::Ramdisk => arguments.ramdisk.as_ref(),
        EntryType::SecondBoot => arguments.second.as_ref(),
        EntryType::DeviceTree => arguments.dt.as_ref(),
        EntryType::Aboot => arguments.aboot.as_ref(),
        EntryType::Ipl => arguments.ipl.as_ref(),
        EntryType::Rpm => arguments.rpm.as_ref(),
        EntryType::Appsbl => arguments.appsbl.as_ref(),
    }
}

fn apply_overrides(
    mut header: Header,
    arguments: &PackArgs,
    console: &mut ConsoleOutputHandler,
) -> Header {
    let supported = header.supported_fields();

    let addresses = [
        (
            &mut header.kernel_address,
            arguments.kernel_address,
            HeaderFields::KERNEL_ADDRESS,
            "kernel address",
        ),
        (
            &mut header.ramdisk_address,
            arguments.ramdisk_address,
            HeaderFields::RAMDISK_ADDRESS,
            "ramdisk address",
        ),
        (
            &mut header.second_address,
            arguments.second_address,
            HeaderFields::SECOND_ADDRESS,
            "second address",
        ),
        (
            &mut header.tags_address,
            arguments.tags_address,
            HeaderFields::TAGS_ADDRESS,
            "tags address",
        ),
        (
            &mut header.ipl_address,
            arguments.ipl_address,
            HeaderFields::IPL_ADDRESS,
            "ipl address",
        ),
        (
            &mut header.rpm_address,
            arguments.rpm_address,
            HeaderFields::RPM_ADDRESS,
            "rpm address",
        ),
        (
            &mut header.appsbl_address,
            arguments.appsbl_address,
            HeaderFields::APPSBL_ADDRESS,
            "appsbl address",
        ),
        (
            &mut header.entrypoint,
            arguments.entrypoint,
            HeaderFields::ENTRYPOINT,
            "entrypoint",
        ),
    ];
    for (field, value, flag, name) in addresses {
        if let Some(value) = value {
            if supported.contains(flag) {
                *field = Some(value);
            } else {
                warn_unsupported(console, name);
            }
        }
    }

    if let Some(page_size) = arguments.page_size {
        if supported.contains(HeaderFields::PAGE_SIZE) {
            header.page_size = Some(page_size);
        } else {
            warn_unsupported(console, "page size");
        }
    }
    if let Some(board) = &arguments.board {
        if supported.contains(HeaderFields::BOARD_NAME) {
            header.board_name = Some(board.clone());
        } else {
            warn_unsupported(console, "board name");
        }
    }
    if let Some(cmdline) = &arguments.cmdline {
        if supported.contains(HeaderFields::CMDLINE) {
            header.cmdline = Some(cmdline.clone());
        } else {
            warn_unsupported(console, "kernel command line");
        }
    }

    header
}

fn warn_unsupported(console: &mut ConsoleOutputHandler, name: &str) {
    console.print_warning_message(&format!(
        "The '{}' field is not stored by this format and will be ignored.",
        name
    ));
}

fn main_defaults(arguments: DefaultsArgs, mut console: ConsoleOutputHandler) {
    let formats = match arguments.format {
        Some(format) => vec![format],
        None => Format::ALL.to_vec(),
    };

    for format in formats {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = Writer::new();
        if let Err(error) = writer.set_format(format) {
            console.print_fatal_error("Failed to select the boot image format", Some(&error));
        }
        if let Err(error) = writer.open_borrowed(&mut buffer) {
            console.print_fatal_error("Failed to open a scratch stream", Some(&error));
        }
        let header = match writer.get_header() {
            Ok(header) => header,
            Err(error) => {
                console.print_fatal_error("Failed to read the format's defaults", Some(&error))
            }
        };

        console.print_message(&format!("{}:", format));
        print_address(&mut console, &header, "kernel address", |header| {
            (HeaderFields::KERNEL_ADDRESS, header.kernel_address)
        });
        print_address(&mut console, &header, "ramdisk address", |header| {
            (HeaderFields::RAMDISK_ADDRESS, header.ramdisk_address)
        });
        print_address(&mut console, &header, "second address", |header| {
            (HeaderFields::SECOND_ADDRESS, header.second_address)
        });
        print_address(&mut console, &header, "tags address", |header| {
            (HeaderFields::TAGS_ADDRESS, header.tags_address)
        });
        print_address(&mut console, &header, "ipl address", |header| {
            (HeaderFields::IPL_ADDRESS, header.ipl_address)
        });
        print_address(&mut console, &header, "rpm address", |header| {
            (HeaderFields::RPM_ADDRESS, header.rpm_address)
        });
        print_address(&mut console, &header, "appsbl address", |header| {
            (HeaderFields::APPSBL_ADDRESS, header.appsbl_address)
        });
        print_address(&mut console, &header, "entrypoint", |header| {
            (HeaderFields::ENTRYPOINT, header.entrypoint)
        });
        if header.supports(HeaderFields::PAGE_SIZE) {
            match header.page_size {
                Some(page_size) => {
                    console.print_message(&format!("    {: <16} {}", "page size", page_size));
                }
                None => console.print_message(&format!("    {: <16} (unset)", "page size")),
            }
        }
        if header.supports(HeaderFields::BOARD_NAME) {
            print_text(&mut console, "board name", header.board_name.as_deref());
        }
        if header.supports(HeaderFields::CMDLINE) {
            print_text(&mut console, "cmdline", header.cmdline.as_deref());
        }
    }
}

fn print_text(console: &mut ConsoleOutputHandler, name: &str, value: Option<&str>) {
    match value {
        Some(value) => console.print_message(&format!("    {: <16} '{}'", name, value)),
        None => console.print_message(&format!("    {: <16} (unset)", name)),
    }
}

fn print_address<F>(console: &mut ConsoleOutputHandler, header: &Header, name: &str, field: F)
where
    F: FnOnce(&Header) -> (HeaderFields, Option<u32>),
{
    let (flag, value) = field(header);
    if !header.supports(flag) {
        return;
    }
    match value {
        Some(value) => console.print_message(&format!("    {: <16} 0x{:08X}", name, value)),
        None => console.print_message(&format!("    {: <16} (unset)", name)),
    }
}

mod console {
    use std::error::Error;
    use std::io::Write;
    use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

    /// An interface for the application to the console output. Handles
    /// things like formatting.
    ///
    /// If this structure ever fails writing, the error will be silently
    /// ignored.
    pub struct ConsoleOutputHandler {
        stream: StandardStream,
    }

    impl ConsoleOutputHandler {
        /// Creates a new structure.
        pub fn new(color: ColorChoice) -> Self {
            ConsoleOutputHandler {
                stream: StandardStream::stdout(color),
            }
        }

        pub fn print_message(&mut self, message: &str) {
            let _ = self.stream.set_color(&ColorSpec::new());
            let _ = writeln!(self.stream, "{}", message);
        }

        pub fn print_error_message(&mut self, message: &str) {
            let _ = self
                .stream
                .set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));

            let _ = write!(self.stream, "error: ");
            self.print_message(message);
        }

        pub fn print_warning_message(&mut self, message: &str) {
            let _ = self
                .stream
                .set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));

            let _ = write!(self.stream, "warning: ");
            self.print_message(message);
        }

        fn print_status(&mut self, colour: &ColorSpec, status: &str, message: &str) {
            let _ = self.stream.set_color(colour);
            let _ = write!(self.stream, "{: >12}", status);
            let _ = self.stream.set_color(&ColorSpec::new());
            let _ = writeln!(self.stream, " {}", message);
        }

        pub fn print_status_success(&mut self, status: &str, message: &str) {
            self.print_status(
                ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true),
                status,
                message,
            );
        }

        fn print_error_cause(&mut self, mut error_opt: Option<&dyn Error>, colour: Color) {
            let colour_spec = {
                let mut colour_spec = ColorSpec::new();
                colour_spec.set_fg(Some(colour));
                colour_spec
            };

            while let Some(error) = error_opt {
                let _ = self.stream.set_color(&colour_spec);
                let _ = write!(self.stream, "caused by: ");
                self.print_message(&error.to_string());
                error_opt = error.source();
            }
        }

        pub fn print_error_as_error(&mut self, message: &str, error_opt: Option<&dyn Error>) {
            self.print_error_message(message);
            self.print_error_cause(error_opt, Color::Red);
        }

        pub fn print_fatal_error(&mut self, message: &str, error_opt: Option<&dyn Error>) -> ! {
            use std::process::exit;
            self.print_error_as_error(message, error_opt);
            exit(1);
        }
    }
}
