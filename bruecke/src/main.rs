use clap::{Parser as ClapParser, Subcommand};
use std::process;

use bruecke::{
    ArgFormat, BigInt, Handle, PACK_2COMP, PACK_LSBYTE_FIRST, PACK_LSWORD_FIRST,
    PACK_MSBYTE_FIRST, PACK_MSWORD_FIRST, pack, unpack,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the bit-level handle encoding of an immediate value
    Encode {
        /// An integer, or one of: nil, true, false, undef
        value: String,
    },
    /// Pack an integer into fixed-width words
    Pack {
        #[arg(allow_hyphen_values = true)]
        value: i64,
        #[arg(long, default_value_t = 4)]
        numwords: usize,
        #[arg(long, default_value_t = 1)]
        wordsize: usize,
        #[arg(long, default_value_t = 0)]
        nails: usize,
        /// Most significant word and byte first (default: least first)
        #[arg(long)]
        big_endian: bool,
        /// Two's complement instead of sign-magnitude
        #[arg(long)]
        twos_complement: bool,
    },
    /// Unpack hex bytes back into an integer
    Unpack {
        /// Bytes in hex, e.g. 2c 01
        #[arg(required = true)]
        bytes: Vec<String>,
        #[arg(long, default_value_t = 1)]
        wordsize: usize,
        #[arg(long, default_value_t = 0)]
        nails: usize,
        #[arg(long)]
        big_endian: bool,
        #[arg(long)]
        twos_complement: bool,
    },
    /// Parse an argument format string and report its shape
    Scan {
        format: String,
        /// Check this argument count against the format's bounds
        #[arg(long)]
        argc: Option<usize>,
    },
}

fn layout_flags(big_endian: bool, twos_complement: bool) -> u32 {
    let mut flags = if big_endian {
        PACK_MSWORD_FIRST | PACK_MSBYTE_FIRST
    } else {
        PACK_LSWORD_FIRST | PACK_LSBYTE_FIRST
    };
    if twos_complement {
        flags |= PACK_2COMP;
    }
    flags
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Encode { value } => {
            let handle = match value.as_str() {
                "nil" => Handle::NIL,
                "true" => Handle::TRUE,
                "false" => Handle::FALSE,
                "undef" => Handle::UNDEF,
                other => {
                    let n: i64 =
                        other.parse().map_err(|_| format!("not an immediate value: {other}"))?;
                    if !Handle::fixnum_fits(n) {
                        return Err(format!("{n} exceeds the fixnum range"));
                    }
                    Handle::from_i64(n)
                }
            };
            println!("{:?}", handle);
            println!("raw  0x{:016x}", handle.raw());
            println!("bits {:064b}", handle.raw());
            println!("kind {}", handle.kind_name());
        }
        Command::Pack { value, numwords, wordsize, nails, big_endian, twos_complement } => {
            let flags = layout_flags(big_endian, twos_complement);
            let mut words = vec![0u8; numwords * wordsize];
            let code = pack(&BigInt::from_i64(value), &mut words, numwords, wordsize, nails, flags)
                .map_err(|e| e.to_string())?;
            let hex: Vec<String> = words.iter().map(|b| format!("{b:02x}")).collect();
            println!("words {}", hex.join(" "));
            println!(
                "sign code {code}{}",
                if code.abs() == 2 { " (truncated)" } else { "" }
            );
        }
        Command::Unpack { bytes, wordsize, nails, big_endian, twos_complement } => {
            let words: Vec<u8> = bytes
                .iter()
                .map(|b| u8::from_str_radix(b, 16).map_err(|_| format!("not a hex byte: {b}")))
                .collect::<Result<_, _>>()?;
            if !words.len().is_multiple_of(wordsize) {
                return Err(format!(
                    "{} bytes do not divide into words of {wordsize}",
                    words.len()
                ));
            }
            let numwords = words.len() / wordsize;
            let flags = layout_flags(big_endian, twos_complement);
            let value = unpack(&words, numwords, wordsize, nails, flags)
                .map_err(|e| e.to_string())?;
            match value.to_i64() {
                Some(n) => println!("{n}"),
                None => println!(
                    "sign {} limbs {:x?} ({} bits)",
                    value.sign,
                    value.limbs,
                    value.bit_len()
                ),
            }
        }
        Command::Scan { format, argc } => {
            let parsed = ArgFormat::parse(&format).map_err(|e| e.to_string())?;
            println!("{parsed:?}");
            println!("slots {}", parsed.slot_count());
            match parsed.max() {
                Some(max) if max == parsed.min() => println!("arity {}", parsed.min()),
                Some(max) => println!("arity {}..{max}", parsed.min()),
                None => println!("arity {}+", parsed.min()),
            }
            if let Some(argc) = argc {
                let fits =
                    argc >= parsed.min() && parsed.max().is_none_or(|max| argc <= max);
                println!("argc {argc}: {}", if fits { "ok" } else { "arity error" });
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(message) = run(cli.command) {
        eprintln!("Error: {message}");
        process::exit(1);
    }
}
