//! Hex-line wire framing over a `TcpStream` (spec.md §6, grounded on
//! `original_source/transport/Transported.go`'s `Transporter`/`Package`):
//! each message is `hex([tag:1][payload])` terminated by `\n`. `tag=0` is a
//! data payload, `tag=1` an error string.

use crate::common::bytes::{from_hex, to_hex};
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

const TAG_DATA: u8 = 0;
const TAG_ERROR: u8 = 1;

pub struct Transporter {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Transporter {
    pub fn new(stream: TcpStream) -> RsqlResult<Transporter> {
        let writer = stream.try_clone()?;
        Ok(Transporter { reader: BufReader::new(stream), writer })
    }

    /// Reads one line, decodes it, and strips the tag byte. Returns `None`
    /// at a clean EOF (client disconnected between statements).
    pub fn receive(&mut self) -> RsqlResult<Option<Vec<u8>>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        let raw = from_hex(line.trim_end_matches('\n'))
            .ok_or_else(|| RsqlError::Other("malformed wire line".to_string()))?;
        if raw.is_empty() {
            return Err(RsqlError::Other("empty wire message".to_string()));
        }
        Ok(Some(raw[1..].to_vec()))
    }

    fn send_tagged(&mut self, tag: u8, payload: &[u8]) -> RsqlResult<()> {
        let mut raw = Vec::with_capacity(1 + payload.len());
        raw.push(tag);
        raw.extend_from_slice(payload);
        let mut line = to_hex(&raw);
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn send_data(&mut self, text: &str) -> RsqlResult<()> {
        self.send_tagged(TAG_DATA, text.as_bytes())
    }

    pub fn send_error(&mut self, text: &str) -> RsqlResult<()> {
        self.send_tagged(TAG_ERROR, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (Transporter, Transporter) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server_stream, _) = listener.accept().unwrap();
        let client_stream = client.join().unwrap();
        (Transporter::new(server_stream).unwrap(), Transporter::new(client_stream).unwrap())
    }

    #[test]
    fn send_data_roundtrips_through_receive() {
        let (mut server, mut client) = pair();
        server.send_data("select * from t").unwrap();
        let received = client.receive().unwrap().unwrap();
        assert_eq!(received, b"select * from t");
    }

    #[test]
    fn send_error_is_distinguishable_by_tag() {
        let (mut server, mut client) = pair();
        server.send_error("table not found: t").unwrap();

        let mut line = String::new();
        client.reader.read_line(&mut line).unwrap();
        let raw = from_hex(line.trim_end_matches('\n')).unwrap();
        assert_eq!(raw[0], TAG_ERROR);
        assert_eq!(&raw[1..], b"table not found: t");
    }

    #[test]
    fn receive_returns_none_at_eof() {
        let (server, mut client) = pair();
        drop(server);
        assert!(client.receive().unwrap().is_none());
    }
}
