//! Relay of operator console messages onto the caller's terminal stream.
//!
//! Every relayed line carries a fixed prefix so the caller can tell server
//! messages apart from git's own output, and each line is flushed on its own
//! so ordering against later proxy traffic is exact.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::errors::ShellError;

/// Marker identifying a line as coming from the authorization layer.
pub const CONSOLE_PREFIX: &str = "> GitLab: ";

/// Write one prefixed, newline-terminated, flushed line.
pub async fn relay_line<W>(out: &mut W, message: &str) -> Result<(), ShellError>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(CONSOLE_PREFIX.as_bytes()).await?;
    out.write_all(message.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

/// Relay a sequence of lines, preserving order. Empty sequences are valid and
/// produce no output.
pub async fn relay_all<W>(out: &mut W, messages: &[String]) -> Result<(), ShellError>
where
    W: AsyncWrite + Unpin,
{
    for message in messages {
        relay_line(out, message).await?;
    }
    Ok(())
}
