//! Minimal length-prefixed framing spoken over the unix socket bridged by
//! `krun_add_vsock_port2` between the guest's init agent (part of the
//! shared init filesystem, an external artifact) and the
//! sandbox manager's guest I/O bridge.
//!
//! Wire format: one byte tag, four byte big-endian length, payload.
//! `Exit`'s payload is a single big-endian i32.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Stdin(Vec<u8>),
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(i32),
}

const TAG_STDIN: u8 = 0;
const TAG_STDOUT: u8 = 1;
const TAG_STDERR: u8 = 2;
const TAG_EXIT: u8 = 3;

pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> std::io::Result<()> {
    match frame {
        Frame::Stdin(data) => write_tagged(writer, TAG_STDIN, data).await,
        Frame::Stdout(data) => write_tagged(writer, TAG_STDOUT, data).await,
        Frame::Stderr(data) => write_tagged(writer, TAG_STDERR, data).await,
        Frame::Exit(code) => write_tagged(writer, TAG_EXIT, &code.to_be_bytes()).await,
    }
}

async fn write_tagged<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    tag: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_u8(tag).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<Frame>> {
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let len = reader.read_u32().await? as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(match tag {
        TAG_STDIN => Frame::Stdin(payload),
        TAG_STDOUT => Frame::Stdout(payload),
        TAG_STDERR => Frame::Stderr(payload),
        TAG_EXIT => {
            let code = i32::from_be_bytes(payload.try_into().unwrap_or_default());
            Frame::Exit(code)
        }
        other => return Err(std::io::Error::other(format!("unknown frame tag {other}"))),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_every_frame_kind() {
        let frames = vec![
            Frame::Stdin(b"hi".to_vec()),
            Frame::Stdout(b"hello\n".to_vec()),
            Frame::Stderr(vec![]),
            Frame::Exit(0),
            Frame::Exit(-1),
        ];

        let (mut writer, mut reader) = tokio::io::duplex(4096);
        for frame in &frames {
            write_frame(&mut writer, frame).await.unwrap();
        }
        drop(writer);

        for expected in &frames {
            let got = read_frame(&mut reader).await.unwrap().unwrap();
            assert_eq!(&got, expected);
        }
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }
}
