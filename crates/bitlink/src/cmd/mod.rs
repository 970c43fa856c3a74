use std::path::PathBuf;

use clap::{Args, Subcommand};

use bitlink_peer::TypeTag;

use crate::exit::{CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::{hex_string, OutputFormat};

pub mod call;
pub mod decode;
pub mod peek;
pub mod poke;
pub mod serve;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host linked variables and functions on a Unix socket.
    Serve(ServeArgs),
    /// Read a variable from a serving peer.
    Peek(PeekArgs),
    /// Write a variable on a serving peer.
    Poke(PokeArgs),
    /// Invoke a function on a serving peer.
    Call(CallArgs),
    /// Decode a hex byte stream into frames.
    Decode(DecodeArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Peek(args) => peek::run(args, format),
        Command::Poke(args) => poke::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Decode(args) => decode::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Variable to expose: INDEX:TYPE[=VALUE] (e.g. 0:u32=42,
    /// 2:bytes=deadbeef) or INDEX:bytes:LEN for a zeroed region.
    #[arg(long = "var", value_name = "SPEC")]
    pub vars: Vec<String>,
    /// Function index to expose; invocations are logged.
    #[arg(long = "func", value_name = "INDEX")]
    pub funcs: Vec<u8>,
    /// Exit after the first client disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct PeekArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Variable index to read.
    pub index: u8,
    /// Value type to request.
    #[arg(long = "type", value_name = "TYPE", default_value = "u32")]
    pub type_name: String,
    /// Byte count for `--type bytes` (1..=8).
    #[arg(long)]
    pub size: Option<usize>,
    /// Response timeout in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub timeout_ms: u64,
}

#[derive(Args, Debug)]
pub struct PokeArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Variable index to write.
    pub index: u8,
    /// Value to store (hex for `--type bytes`).
    #[arg(allow_hyphen_values = true)]
    pub value: String,
    /// Value type to send.
    #[arg(long = "type", value_name = "TYPE", default_value = "u32")]
    pub type_name: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Function index to invoke.
    pub index: u8,
    /// Argument bytes as hex (1..=8 bytes); a single filler byte when
    /// omitted.
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Raw stream bytes as hex.
    pub hex: String,
}

pub(crate) fn parse_type(name: &str) -> CliResult<TypeTag> {
    TypeTag::parse(name).ok_or_else(|| CliError::new(USAGE, format!("unknown type: {name}")))
}

pub(crate) fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            "hex input must have an even number of digits",
        ));
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16).map_err(|_| {
                CliError::new(
                    DATA_INVALID,
                    format!("invalid hex digits at offset {i}: {}", &cleaned[i..i + 2]),
                )
            })
        })
        .collect()
}

fn parse_num<T: std::str::FromStr>(tag: TypeTag, value: &str) -> CliResult<T> {
    value.parse().map_err(|_| {
        CliError::new(
            DATA_INVALID,
            format!("invalid {} value: {value}", tag.name()),
        )
    })
}

/// Little-endian wire bytes for a value given as text.
pub(crate) fn typed_bytes(tag: TypeTag, value: &str) -> CliResult<Vec<u8>> {
    Ok(match tag {
        TypeTag::U8 => parse_num::<u8>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::I8 => parse_num::<i8>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::U16 => parse_num::<u16>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::I16 => parse_num::<i16>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::U32 => parse_num::<u32>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::I32 => parse_num::<i32>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::U64 => parse_num::<u64>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::I64 => parse_num::<i64>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::F32 => parse_num::<f32>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::F64 => parse_num::<f64>(tag, value)?.to_le_bytes().to_vec(),
        TypeTag::Bytes => parse_hex(value)?,
    })
}

fn le_u64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Render received little-endian bytes as the given type.
pub(crate) fn render_value(tag: TypeTag, bytes: &[u8]) -> (String, serde_json::Value) {
    match tag {
        TypeTag::U8 | TypeTag::U16 | TypeTag::U32 | TypeTag::U64 => {
            let v = le_u64(bytes);
            (v.to_string(), serde_json::json!(v))
        }
        TypeTag::I8 => {
            let v = le_u64(bytes) as u8 as i8;
            (v.to_string(), serde_json::json!(v))
        }
        TypeTag::I16 => {
            let v = le_u64(bytes) as u16 as i16;
            (v.to_string(), serde_json::json!(v))
        }
        TypeTag::I32 => {
            let v = le_u64(bytes) as u32 as i32;
            (v.to_string(), serde_json::json!(v))
        }
        TypeTag::I64 => {
            let v = le_u64(bytes) as i64;
            (v.to_string(), serde_json::json!(v))
        }
        TypeTag::F32 => {
            let v = f32::from_bits(le_u64(bytes) as u32);
            (v.to_string(), serde_json::json!(v))
        }
        TypeTag::F64 => {
            let v = f64::from_bits(le_u64(bytes));
            (v.to_string(), serde_json::json!(v))
        }
        TypeTag::Bytes => {
            let hex = hex_string(bytes);
            let json = serde_json::json!(hex);
            (hex, json)
        }
    }
}
