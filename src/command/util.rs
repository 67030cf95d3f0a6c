use super::command_error::RedisCommandError;
use crate::protocol::Resp;

pub fn get_bytes_vec(resp: Option<&Resp>) -> Result<Vec<u8>, RedisCommandError> {
    match resp {
        Some(Resp::String(x)) | Some(Resp::BulkString(x)) => Ok(x.to_vec()),
        _ => Err(RedisCommandError::ArgNumber),
    }
}

pub fn parse_duration(bytes: Vec<u8>) -> Result<u64, RedisCommandError> {
    parse_u64(bytes)
}

pub fn parse_u64(bytes: Vec<u8>) -> Result<u64, RedisCommandError> {
    let s = std::str::from_utf8(&bytes[..])?;
    Ok(s.parse::<u64>()?)
}

pub fn parse_variation(bytes: Vec<u8>) -> Result<i64, RedisCommandError> {
    let delta = std::str::from_utf8(&bytes[..])?;
    Ok(delta.parse::<i64>()?)
}

pub fn parse_port(bytes: Vec<u8>) -> Result<u16, RedisCommandError> {
    let port = std::str::from_utf8(&bytes[..])?;
    Ok(port.parse::<u16>()?)
}

pub fn parse_ipv4(bytes: Vec<u8>) -> Result<std::net::Ipv4Addr, RedisCommandError> {
    let host = std::str::from_utf8(&bytes[..])?;
    host.parse::<std::net::Ipv4Addr>()
        .map_err(|_| RedisCommandError::InvalidCommand)
}
