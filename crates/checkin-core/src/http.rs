//! HTTP/1.1 framing for a check-in
//!
//! Only what a check-in needs: one `POST` with a form-encoded body and
//! `Connection: close`. The response head is parsed by `httparse`, and the
//! body is delimited by `Content-Length`, chunked encoding or connection
//! close. Works on caller-provided buffers, no allocation.

use core::fmt::{self, Write};

use httparse::Status;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::error::{EncodeError, EndpointError, ResponseError};

const HTTP_SCHEME: &str = "http://";
const DEFAULT_HTTP_PORT: u16 = 80;
const USER_AGENT: &str = concat!("checkin-station/", env!("CARGO_PKG_VERSION"));
/// Header slots offered to the parser; a reply with more is rejected.
const MAX_RESPONSE_HEADERS: usize = 24;

/// Parsed `http://host[:port][/path]` URL, borrowing from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

impl<'a> Endpoint<'a> {
    pub fn parse(url: &'a str) -> Result<Self, EndpointError> {
        let rest = url
            .trim()
            .strip_prefix(HTTP_SCHEME)
            .ok_or(EndpointError::UnsupportedScheme)?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or(EndpointError::InvalidPort)?;
                (host, port)
            }
            None => (authority, DEFAULT_HTTP_PORT),
        };

        if host.is_empty() {
            return Err(EndpointError::MissingHost);
        }

        Ok(Self { host, port, path })
    }
}

/// `fmt::Write` over a fixed byte buffer; overflow sticks until the end.
struct SliceWriter<'b> {
    buf: &'b mut [u8],
    len: usize,
    overflowed: bool,
}

impl<'b> SliceWriter<'b> {
    fn new(buf: &'b mut [u8]) -> Self {
        Self {
            buf,
            len: 0,
            overflowed: false,
        }
    }

    fn finish(self) -> Result<usize, EncodeError> {
        if self.overflowed {
            Err(EncodeError::BufferFull {
                capacity: self.buf.len(),
            })
        } else {
            Ok(self.len)
        }
    }
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let end = self.len + bytes.len();
        if end > self.buf.len() {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

/// Counts bytes written so `Content-Length` is known before the body is emitted.
struct LengthCounter(usize);

impl Write for LengthCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Form body that can be rendered twice (once to measure, once to write).
pub trait FormBody {
    fn write_form<W: Write>(&self, out: &mut W) -> fmt::Result;
}

/// Bytes left as-is in a form component; everything else is percent-encoded.
const FORM_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Write one `key=value` pair of an `application/x-www-form-urlencoded` body.
pub fn write_form_pair<W: Write>(
    out: &mut W,
    first: bool,
    key: &str,
    value: fmt::Arguments<'_>,
) -> fmt::Result {
    if !first {
        out.write_char('&')?;
    }
    write!(out, "{}=", utf8_percent_encode(key, FORM_UNRESERVED))?;
    FormEncoder(out).write_fmt(value)
}

/// Percent-encodes everything routed through it.
struct FormEncoder<'w, W: Write>(&'w mut W);

impl<W: Write> Write for FormEncoder<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write!(self.0, "{}", utf8_percent_encode(s, FORM_UNRESERVED))
    }
}

/// Encode a complete `POST` request for `endpoint` into `buf`.
///
/// Returns the number of bytes written.
pub fn encode_post<B: FormBody>(
    buf: &mut [u8],
    endpoint: &Endpoint<'_>,
    body: &B,
) -> Result<usize, EncodeError> {
    let mut counter = LengthCounter(0);
    // LengthCounter never fails
    let _ = body.write_form(&mut counter);
    let content_length = counter.0;

    let mut out = SliceWriter::new(buf);
    let _ = write_head(&mut out, endpoint, content_length).and_then(|_| body.write_form(&mut out));
    out.finish()
}

fn write_head<W: Write>(
    out: &mut W,
    endpoint: &Endpoint<'_>,
    content_length: usize,
) -> fmt::Result {
    write!(out, "POST {} HTTP/1.1\r\n", endpoint.path)?;
    if endpoint.port == DEFAULT_HTTP_PORT {
        write!(out, "Host: {}\r\n", endpoint.host)?;
    } else {
        write!(out, "Host: {}:{}\r\n", endpoint.host, endpoint.port)?;
    }
    write!(out, "User-Agent: {}\r\n", USER_AGENT)?;
    out.write_str("Accept: application/json\r\n")?;
    out.write_str("Content-Type: application/x-www-form-urlencoded\r\n")?;
    write!(out, "Content-Length: {}\r\n", content_length)?;
    out.write_str("Connection: close\r\n\r\n")
}

/// Status code and body of a received response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response<'b> {
    pub status: u16,
    pub body: &'b [u8],
}

impl Response<'_> {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// How the body following the head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Chunked,
    Length(usize),
    UntilClose,
}

impl BodyFraming {
    fn from_headers(headers: &[httparse::Header<'_>]) -> Self {
        let mut framing = Self::UntilClose;
        for header in headers {
            let value = header.value.trim_ascii();
            if header.name.eq_ignore_ascii_case("transfer-encoding")
                && value.eq_ignore_ascii_case(b"chunked")
            {
                // Transfer-Encoding wins over Content-Length
                return Self::Chunked;
            }
            if header.name.eq_ignore_ascii_case("content-length")
                && let Some(len) = core::str::from_utf8(value)
                    .ok()
                    .and_then(|v| v.parse::<usize>().ok())
            {
                framing = Self::Length(len);
            }
        }
        framing
    }
}

/// Parse the bytes of a response read until the server closed the connection.
///
/// The buffer may be truncated; only the status line is mandatory. A chunked
/// body is decoded in place, which is why the buffer is taken mutably.
pub fn parse_response(bytes: &mut [u8]) -> Result<Response<'_>, ResponseError> {
    if bytes.is_empty() {
        return Err(ResponseError::Empty);
    }

    let (status, head_len, framing) = {
        let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(bytes) {
            Ok(Status::Complete(head_len)) => {
                let status = response.code.ok_or(ResponseError::Truncated)?;
                (status, head_len, BodyFraming::from_headers(response.headers))
            }
            // Status line made it, the rest of the head did not
            Ok(Status::Partial) => {
                return match response.code {
                    Some(status) => Ok(Response { status, body: &[] }),
                    None => Err(ResponseError::Truncated),
                };
            }
            Err(e) => return Err(ResponseError::Malformed(e)),
        }
    };

    let rest = &mut bytes[head_len..];
    let body: &[u8] = match framing {
        BodyFraming::UntilClose => rest,
        BodyFraming::Length(len) => {
            let len = len.min(rest.len());
            &rest[..len]
        }
        BodyFraming::Chunked => {
            let len = dechunk(rest);
            &rest[..len]
        }
    };

    Ok(Response { status, body })
}

/// Decode a chunked body in place and return the decoded length. A body cut
/// short by the buffer keeps the data that did arrive.
fn dechunk(body: &mut [u8]) -> usize {
    let mut read = 0;
    let mut written = 0;

    while let Ok(Status::Complete((size_len, size))) = httparse::parse_chunk_size(&body[read..]) {
        if size == 0 {
            break;
        }
        read += size_len;

        let available = body.len() - read;
        let take = usize::try_from(size).map_or(available, |size| size.min(available));
        body.copy_within(read..read + take, written);
        written += take;
        read += take;

        match body[read..].strip_prefix(b"\r\n") {
            Some(_) => read += 2,
            None => break,
        }
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pairs<'p>(&'p [(&'p str, &'p str)]);

    impl FormBody for Pairs<'_> {
        fn write_form<W: Write>(&self, out: &mut W) -> fmt::Result {
            for (i, (key, value)) in self.0.iter().enumerate() {
                write_form_pair(out, i == 0, key, format_args!("{}", value))?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_parse_endpoint_variants() {
        assert_eq!(
            Endpoint::parse("http://checkin.local:8080/api/rfid_checkin.php"),
            Ok(Endpoint {
                host: "checkin.local",
                port: 8080,
                path: "/api/rfid_checkin.php"
            })
        );
        assert_eq!(
            Endpoint::parse("http://10.0.0.5"),
            Ok(Endpoint {
                host: "10.0.0.5",
                port: 80,
                path: "/"
            })
        );
    }

    #[test]
    fn test_parse_endpoint_errors() {
        assert_eq!(
            Endpoint::parse("https://secure.example"),
            Err(EndpointError::UnsupportedScheme)
        );
        assert_eq!(Endpoint::parse("http:///path"), Err(EndpointError::MissingHost));
        assert_eq!(
            Endpoint::parse("http://host:0/"),
            Err(EndpointError::InvalidPort)
        );
        assert_eq!(
            Endpoint::parse("http://host:http/"),
            Err(EndpointError::InvalidPort)
        );
    }

    #[test]
    fn test_encode_post_request() {
        let endpoint =
            Endpoint::parse("http://192.168.1.100/rfid-checkin/api/rfid_checkin.php").unwrap();
        let body = Pairs(&[("rfid", "A1B2C3"), ("device_name", "Main Entrance & Hall")]);
        let mut buf = [0u8; 512];

        let len = encode_post(&mut buf, &endpoint, &body).unwrap();
        let text = core::str::from_utf8(&buf[..len]).unwrap();

        assert!(text.starts_with("POST /rfid-checkin/api/rfid_checkin.php HTTP/1.1\r\n"));
        assert!(text.contains("Host: 192.168.1.100\r\n"));
        assert!(text.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        let expected_body = "rfid=A1B2C3&device_name=Main%20Entrance%20%26%20Hall";
        assert!(text.contains(&std::format!("Content-Length: {}\r\n", expected_body.len())));
        assert!(text.ends_with(&std::format!("\r\n\r\n{}", expected_body)));
    }

    #[test]
    fn test_encode_includes_non_default_port() {
        let endpoint = Endpoint::parse("http://localhost:8000/checkin").unwrap();
        let mut buf = [0u8; 256];
        let len = encode_post(&mut buf, &endpoint, &Pairs(&[("rfid", "0A0B0C")])).unwrap();
        let text = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(text.contains("Host: localhost:8000\r\n"));
    }

    #[test]
    fn test_encode_reports_overflow() {
        let endpoint = Endpoint::parse("http://host/").unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(
            encode_post(&mut buf, &endpoint, &Pairs(&[("rfid", "A1B2C3")])),
            Err(EncodeError::BufferFull { capacity: 32 })
        );
    }

    #[test]
    fn test_parse_response_with_body() {
        let mut raw =
            *b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"success\":true}";
        let response = parse_response(&mut raw).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body, b"{\"success\":true}");
    }

    #[test]
    fn test_parse_response_honours_content_length() {
        let mut raw = *b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}\r\nstray";
        let response = parse_response(&mut raw).unwrap();
        assert_eq!(response.body, b"{}");
    }

    #[test]
    fn test_parse_response_chunked() {
        let mut raw = *b"HTTP/1.1 404 Not Found\r\nTransfer-Encoding: chunked\r\n\r\n\
            10\r\n{\"error\":\"none\"}\r\n0\r\n\r\n";
        let response = parse_response(&mut raw).unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(response.body, b"{\"error\":\"none\"}");
    }

    #[test]
    fn test_parse_response_joins_every_chunk() {
        let mut raw = *b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            7\r\n{\"error\r\n9;ext=1\r\n\":\"none\"}\r\n0\r\n\r\n";
        let response = parse_response(&mut raw).unwrap();
        assert_eq!(response.body, b"{\"error\":\"none\"}");
    }

    #[test]
    fn test_parse_response_keeps_partial_last_chunk() {
        let mut raw = *b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            2\r\n{\"\r\n20\r\nsucc";
        let response = parse_response(&mut raw).unwrap();
        assert_eq!(response.body, b"{\"succ");
    }

    #[test]
    fn test_parse_response_truncated_head() {
        let mut raw = *b"HTTP/1.0 503 Service Unavailable\r\nRetry-Af";
        let response = parse_response(&mut raw).unwrap();
        assert_eq!(response.status, 503);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_parse_response_rejects_garbage() {
        assert_eq!(parse_response(&mut []), Err(ResponseError::Empty));
        assert_eq!(parse_response(&mut b"HTTP/1.1 2".clone()), Err(ResponseError::Truncated));
        assert!(matches!(
            parse_response(&mut b"SSH-2.0-OpenSSH_9.6\r\n".clone()),
            Err(ResponseError::Malformed(_))
        ));
        assert!(matches!(
            parse_response(&mut b"HTTP/1.1 OK\r\n\r\n".clone()),
            Err(ResponseError::Malformed(_))
        ));
    }
}
