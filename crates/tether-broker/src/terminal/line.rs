//! Line editing for the interactive prompt

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

const READ_CHUNK: usize = 1024;

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const ESC: u8 = 0x1b;
const DELETE: u8 = 0x7f;

/// Where we are inside a terminal escape sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Start,
    Sequence,
}

/// Outcome of feeding one byte
enum Step {
    More,
    Line,
    Cancel,
    Eof,
}

/// Reads edited lines from a raw byte stream.
///
/// Bytes read past the end of a line are kept, and handed out first when
/// the reader is used as a plain [`AsyncRead`] (e.g. as the stdin of a
/// relayed session).
pub struct LineReader<R> {
    inner: R,
    pending: BytesMut,
    line: Vec<u8>,
    escape: Escape,
    after_cr: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(READ_CHUNK),
            line: Vec::new(),
            escape: Escape::None,
            after_cr: false,
        }
    }

    /// Read one line, writing the echo to `echo` when given.
    ///
    /// Ctrl-C abandons the current line and yields an empty one. Ctrl-D on an
    /// empty line, or the end of the stream, yields `None`.
    pub async fn read_line<W>(&mut self, mut echo: Option<&mut W>) -> io::Result<Option<String>>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut echoed = Vec::new();

        loop {
            while self.pending.has_remaining() {
                let byte = self.pending.get_u8();
                let step = self.feed(byte, &mut echoed);

                if let Some(out) = echo.as_deref_mut() {
                    if !echoed.is_empty() {
                        out.write_all(&echoed).await?;
                        out.flush().await?;
                    }
                }
                echoed.clear();

                match step {
                    Step::More => {}
                    Step::Line => return Ok(Some(self.take_line())),
                    Step::Cancel => {
                        self.line.clear();
                        return Ok(Some(String::new()));
                    }
                    Step::Eof => return Ok(None),
                }
            }

            self.pending.reserve(READ_CHUNK);
            if self.inner.read_buf(&mut self.pending).await? == 0 {
                return Ok(if self.line.is_empty() {
                    None
                } else {
                    Some(self.take_line())
                });
            }
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        line
    }

    fn feed(&mut self, byte: u8, echo: &mut Vec<u8>) -> Step {
        let after_cr = std::mem::replace(&mut self.after_cr, false);

        match self.escape {
            Escape::Start => {
                self.escape = if byte == b'[' || byte == b'O' {
                    Escape::Sequence
                } else {
                    Escape::None
                };
                return Step::More;
            }
            Escape::Sequence => {
                if (0x40..=0x7e).contains(&byte) {
                    self.escape = Escape::None;
                }
                return Step::More;
            }
            Escape::None => {}
        }

        match byte {
            b'\r' => {
                self.after_cr = true;
                echo.extend_from_slice(b"\r\n");
                Step::Line
            }
            b'\n' if after_cr => Step::More,
            b'\n' => {
                echo.extend_from_slice(b"\r\n");
                Step::Line
            }
            BACKSPACE | DELETE => {
                if self.pop_char() {
                    echo.extend_from_slice(b"\x08 \x08");
                }
                Step::More
            }
            CTRL_C => {
                echo.extend_from_slice(b"^C\r\n");
                Step::Cancel
            }
            CTRL_D if self.line.is_empty() => Step::Eof,
            ESC => {
                self.escape = Escape::Start;
                Step::More
            }
            b if b >= 0x20 => {
                self.line.push(b);
                echo.push(b);
                Step::More
            }
            _ => Step::More,
        }
    }

    /// Remove the last character, including all bytes of a UTF-8 sequence
    fn pop_char(&mut self) -> bool {
        while let Some(byte) = self.line.pop() {
            if byte & 0xc0 != 0x80 {
                return true;
            }
        }
        false
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LineReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // The line feed of a CRLF line ending belongs to the line already taken.
        if this.after_cr {
            if this.pending.is_empty() {
                let mut chunk = [0u8; READ_CHUNK];
                let mut read = ReadBuf::new(&mut chunk);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read))?;
                if read.filled().is_empty() {
                    return Poll::Ready(Ok(()));
                }
                this.pending.extend_from_slice(read.filled());
            }
            this.after_cr = false;
            if this.pending.first() == Some(&b'\n') {
                this.pending.advance(1);
            }
        }

        if this.pending.has_remaining() {
            let n = this.pending.len().min(buf.remaining());
            buf.put_slice(&this.pending.split_to(n));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}
