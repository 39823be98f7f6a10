//! In-memory duplex transport standing in for a real TCP+TLS socket in
//! tests: both sides of `Sender::connect`/`run_receive_loop` only need
//! `AsyncRead + AsyncWrite`, so a `tokio::io::duplex` pair wires a child's
//! `Sender` straight to a parent's `Receiver` worker loop without a socket.

use tokio::io::{DuplexStream, duplex};

/// Default buffer size for a mock duplex pair; generous enough that tests
/// pushing a handful of chart definitions and metric ticks never block on
/// a full pipe.
pub const DEFAULT_BUF_SIZE: usize = 64 * 1024;

/// One connected half of an in-memory child/parent pair.
pub type MockTransport = DuplexStream;

/// Build a connected `(child, parent)` pair of in-memory transports: bytes
/// written to `child` are readable from `parent` and vice versa.
#[must_use]
pub fn mock_pair() -> (MockTransport, MockTransport) {
    duplex(DEFAULT_BUF_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn writes_on_one_side_read_on_the_other() {
        let (mut child, mut parent) = mock_pair();
        child.write_all(b"CHART \"cpu.user\"\n").await.unwrap();
        let mut buf = [0u8; 32];
        let n = parent.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"CHART \"cpu.user\"\n");
    }
}
