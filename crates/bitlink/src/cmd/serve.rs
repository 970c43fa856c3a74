use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixListener;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use bitlink_peer::{LinkedVar, Peer, TypeTag};
use bitlink_transport::StreamTransport;

use crate::cmd::{parse_hex, parse_type, ServeArgs};
use crate::exit::{io_error, peer_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{hex_string, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let vars = parse_var_specs(&args.vars)?;

    remove_stale_socket(&args.path)?;
    let listener = UnixListener::bind(&args.path)
        .map_err(|err| io_error("failed to bind socket", err))?;
    info!(path = %args.path.display(), "serving");

    loop {
        let (stream, _) = listener
            .accept()
            .map_err(|err| io_error("accept failed", err))?;
        let transport = StreamTransport::unix(stream)
            .map_err(|err| transport_error("failed to prepare stream", err))?;

        let mut peer = Peer::new(transport, u8::MAX, u8::MAX);
        for (index, var) in &vars {
            peer.link_variable(*index, var)
                .map_err(|err| peer_error("failed to link variable", err))?;
        }
        for &index in &args.funcs {
            peer.link_function(index, move |data| {
                info!(index, args = %hex_string(data), "function invoked");
            })
            .map_err(|err| peer_error("failed to link function", err))?;
        }

        info!("client connected");
        loop {
            peer.poll();
            if peer.transport().peer_gone() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        info!("client disconnected");

        if args.once {
            return Ok(SUCCESS);
        }
    }
}

fn remove_stale_socket(path: &std::path::Path) -> CliResult<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path).map_err(|err| io_error("failed to remove stale socket", err))
        }
        Ok(_) => Err(CliError::new(
            USAGE,
            format!("existing path is not a socket: {}", path.display()),
        )),
        Err(_) => Ok(()),
    }
}

fn parse_var_specs(specs: &[String]) -> CliResult<Vec<(u8, LinkedVar)>> {
    specs.iter().map(|spec| parse_var_spec(spec)).collect()
}

/// `INDEX:TYPE[=VALUE]`, or `INDEX:bytes:LEN` for a zeroed region.
fn parse_var_spec(spec: &str) -> CliResult<(u8, LinkedVar)> {
    let (index, rest) = spec
        .split_once(':')
        .ok_or_else(|| CliError::new(USAGE, format!("variable spec missing ':': {spec}")))?;
    let index: u8 = index
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid index in variable spec: {spec}")))?;

    if let Some(len) = rest.strip_prefix("bytes:") {
        let len: usize = len
            .parse()
            .map_err(|_| CliError::new(USAGE, format!("invalid length in variable spec: {spec}")))?;
        let var = LinkedVar::bytes(len).map_err(|err| peer_error("invalid variable", err))?;
        return Ok((index, var));
    }

    let (type_name, value) = match rest.split_once('=') {
        Some((type_name, value)) => (type_name, Some(value)),
        None => (rest, None),
    };
    let tag = parse_type(type_name)?;
    Ok((index, make_typed_var(tag, value)?))
}

fn make_typed_var(tag: TypeTag, value: Option<&str>) -> CliResult<LinkedVar> {
    fn parsed<T: std::str::FromStr + Default>(tag: TypeTag, value: Option<&str>) -> CliResult<T> {
        match value {
            None => Ok(T::default()),
            Some(text) => text.parse().map_err(|_| {
                CliError::new(
                    USAGE,
                    format!("invalid {} value: {text}", tag.name()),
                )
            }),
        }
    }

    Ok(match tag {
        TypeTag::U8 => LinkedVar::value(parsed::<u8>(tag, value)?),
        TypeTag::I8 => LinkedVar::value(parsed::<i8>(tag, value)?),
        TypeTag::U16 => LinkedVar::value(parsed::<u16>(tag, value)?),
        TypeTag::I16 => LinkedVar::value(parsed::<i16>(tag, value)?),
        TypeTag::U32 => LinkedVar::value(parsed::<u32>(tag, value)?),
        TypeTag::I32 => LinkedVar::value(parsed::<i32>(tag, value)?),
        TypeTag::U64 => LinkedVar::value(parsed::<u64>(tag, value)?),
        TypeTag::I64 => LinkedVar::value(parsed::<i64>(tag, value)?),
        TypeTag::F32 => LinkedVar::value(parsed::<f32>(tag, value)?),
        TypeTag::F64 => LinkedVar::value(parsed::<f64>(tag, value)?),
        TypeTag::Bytes => {
            let data = parse_hex(value.ok_or_else(|| {
                CliError::new(USAGE, "bytes variables need a hex value or an explicit length")
            })?)?;
            LinkedVar::from_bytes(&data).map_err(|err| peer_error("invalid variable", err))?
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_spec_with_value() {
        let (index, var) = parse_var_spec("3:u32=42").unwrap();
        assert_eq!(index, 3);
        assert_eq!(var.type_tag(), Some(TypeTag::U32));
        assert_eq!(var.get::<u32>(), Some(42));
    }

    #[test]
    fn parses_typed_spec_without_value() {
        let (_, var) = parse_var_spec("0:i16").unwrap();
        assert_eq!(var.get::<i16>(), Some(0));
    }

    #[test]
    fn parses_sized_bytes_spec() {
        let (index, var) = parse_var_spec("7:bytes:12").unwrap();
        assert_eq!(index, 7);
        assert_eq!(var.size(), 12);
    }

    #[test]
    fn parses_hex_bytes_spec() {
        let (_, var) = parse_var_spec("1:bytes=deadbeef").unwrap();
        assert_eq!(var.to_vec(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(parse_var_spec("nocolon").is_err());
        assert!(parse_var_spec("300:u8=1").is_err());
        assert!(parse_var_spec("1:quaternion=0").is_err());
        assert!(parse_var_spec("1:u8=999").is_err());
        assert!(parse_var_spec("1:bytes").is_err());
    }
}
