use std::time::Duration;

use bitlink_peer::{Peer, TypeTag, MAX_PAYLOAD};
use bitlink_transport::connect_unix;

use crate::cmd::{parse_type, render_value, PeekArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{emit, OutputFormat};

pub fn run(args: PeekArgs, format: OutputFormat) -> CliResult<i32> {
    let tag = parse_type(&args.type_name)?;
    let size = resolve_size(tag, args.size)?;

    let transport =
        connect_unix(&args.path).map_err(|err| transport_error("connect failed", err))?;
    let mut peer = Peer::new(transport, 0, 0);
    peer.set_timeout(Duration::from_millis(args.timeout_ms));

    let mut buf = [0u8; MAX_PAYLOAD];
    peer.read(args.index, &mut buf[..size])
        .map_err(|err| peer_error("read failed", err))?;

    let (text, value) = render_value(tag, &buf[..size]);
    emit(
        format,
        &text,
        &serde_json::json!({
            "index": args.index,
            "type": tag.name(),
            "size": size,
            "value": value,
        }),
    );
    Ok(SUCCESS)
}

/// The request size: the type's width, or an explicit `--size` for `bytes`.
fn resolve_size(tag: TypeTag, explicit: Option<usize>) -> CliResult<usize> {
    match (tag.size(), explicit) {
        (Some(size), None) => Ok(size),
        (Some(size), Some(given)) if given == size => Ok(size),
        (Some(size), Some(given)) => Err(CliError::new(
            USAGE,
            format!("--size {given} conflicts with {} ({size} bytes)", tag.name()),
        )),
        (None, Some(size)) if (1..=MAX_PAYLOAD).contains(&size) => Ok(size),
        (None, Some(size)) => Err(CliError::new(
            USAGE,
            format!("byte reads take --size 1..=8, got {size}"),
        )),
        (None, None) => Err(CliError::new(USAGE, "--type bytes needs an explicit --size")),
    }
}
