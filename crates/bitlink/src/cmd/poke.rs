use bitlink_peer::{Peer, MAX_PAYLOAD};
use bitlink_transport::{connect_unix, Transport};

use crate::cmd::{parse_type, typed_bytes, PokeArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{emit, hex_string, OutputFormat};

pub fn run(args: PokeArgs, format: OutputFormat) -> CliResult<i32> {
    let tag = parse_type(&args.type_name)?;
    let data = typed_bytes(tag, &args.value)?;
    if data.is_empty() || data.len() > MAX_PAYLOAD {
        return Err(CliError::new(
            USAGE,
            format!("value must encode to 1..=8 bytes, got {}", data.len()),
        ));
    }

    let transport =
        connect_unix(&args.path).map_err(|err| transport_error("connect failed", err))?;
    let mut peer = Peer::new(transport, 0, 0);
    peer.write(args.index, &data)
        .map_err(|err| peer_error("write failed", err))?;
    // Fire-and-forget on the wire, but get the bytes out before we exit.
    peer.transport_mut().flush_tx();

    emit(
        format,
        &format!("wrote {} to index {}", hex_string(&data), args.index),
        &serde_json::json!({
            "index": args.index,
            "type": tag.name(),
            "data": hex_string(&data),
        }),
    );
    Ok(SUCCESS)
}
