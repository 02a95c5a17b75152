use futures::{SinkExt, StreamExt};
use tokio::io::duplex;
use tokio_util::codec::{Framed, FramedRead, FramedWrite};
use wswire::{
    close::{CloseCode, CloseFrame},
    codec::Codec,
    Frame, OpCode, Options, ProtocolError, Side, WebSocketError,
};

fn init_logger() {
    let _ = simple_logger::init_with_level(log::Level::Trace);
}

#[tokio::test]
async fn test_frames_over_small_pipe() -> anyhow::Result<()> {
    init_logger();

    // a small pipe splits every frame across several reads
    let (client, server) = duplex(16);
    let mut sink = FramedWrite::new(client, Codec::new(Side::Client));
    let mut stream = FramedRead::new(server, Codec::new(Side::Server));

    let writer = tokio::spawn(async move {
        sink.send(Frame::text("Hello, World")).await?;
        sink.send(Frame::binary(vec![7u8; 70_000])).await?;
        sink.send(Frame::ping("beat")).await?;
        sink.close().await?;
        Ok::<_, WebSocketError>(())
    });

    let frame = stream.next().await.expect("text frame")?;
    assert_eq!(frame.opcode(), OpCode::Text);
    assert!(!frame.is_masked());
    assert_eq!(&frame.payload[..], b"Hello, World");

    let frame = stream.next().await.expect("binary frame")?;
    assert_eq!(frame.opcode(), OpCode::Binary);
    assert_eq!(frame.payload.len(), 70_000);
    assert!(frame.payload.iter().all(|byte| *byte == 7));

    let frame = stream.next().await.expect("ping frame")?;
    assert_eq!(frame.opcode(), OpCode::Ping);
    assert_eq!(&frame.payload[..], b"beat");

    assert!(stream.next().await.is_none());
    writer.await??;
    Ok(())
}

#[tokio::test]
async fn test_echo_and_close() -> anyhow::Result<()> {
    init_logger();

    let (client, server) = duplex(1024);

    let echo = tokio::spawn(async move {
        let mut ws = Framed::new(server, Codec::new(Side::Server));
        while let Some(frame) = ws.next().await {
            let frame = frame?;
            match frame.opcode() {
                OpCode::Ping => ws.send(Frame::pong(&frame.payload)).await?,
                OpCode::Close => {
                    let body = CloseFrame::decode(&frame.payload)?;
                    let code = body.map(|body| body.code);
                    ws.send(Frame::close(code.map(|code| CloseFrame::new(code, "")).as_ref()))
                        .await?;
                    return Ok(code);
                }
                _ => ws.send(frame).await?,
            }
        }
        Ok::<_, WebSocketError>(None)
    });

    let mut ws = Framed::new(client, Codec::new(Side::Client));

    ws.send(Frame::text("echo me")).await?;
    let frame = ws.next().await.expect("echo")?;
    assert_eq!(frame.opcode(), OpCode::Text);
    assert_eq!(&frame.payload[..], b"echo me");

    ws.send(Frame::ping("are you there?")).await?;
    let frame = ws.next().await.expect("pong")?;
    assert_eq!(frame.opcode(), OpCode::Pong);
    assert_eq!(&frame.payload[..], b"are you there?");

    ws.send(Frame::close(Some(&CloseFrame::new(CloseCode::Away, "leaving"))))
        .await?;
    let frame = ws.next().await.expect("close echo")?;
    assert_eq!(frame.opcode(), OpCode::Close);
    assert_eq!(&frame.payload[..], &1001u16.to_be_bytes());

    assert_eq!(echo.await??, Some(CloseCode::Away));
    Ok(())
}

#[tokio::test]
async fn test_fragmented_message() -> anyhow::Result<()> {
    let (client, server) = duplex(1024);
    let mut sink = FramedWrite::new(server, Codec::new(Side::Server));
    let mut stream = FramedRead::new(client, Codec::new(Side::Client));

    sink.send(Frame::new(false, OpCode::Text, "fragment1")).await?;
    sink.send(Frame::pong("")).await?;
    sink.send(Frame::continuation(true, ",fragment2")).await?;

    let mut message = Vec::new();
    let mut opcodes = Vec::new();
    while let Some(frame) = stream.next().await {
        let frame = frame?;
        opcodes.push(frame.opcode());
        if frame.opcode().is_data() {
            message.extend_from_slice(&frame.payload);
        }
        if frame.opcode().is_data() && frame.is_fin() {
            break;
        }
    }

    assert_eq!(
        opcodes,
        vec![OpCode::Text, OpCode::Pong, OpCode::Continuation]
    );
    assert_eq!(message, b"fragment1,fragment2");
    Ok(())
}

#[tokio::test]
async fn test_violations_end_the_stream() -> anyhow::Result<()> {
    let (client, server) = duplex(1024);
    // the peer pretends to be a server talking to a server
    let mut sink = FramedWrite::new(client, Codec::new(Side::Server));
    let mut stream = FramedRead::new(server, Codec::new(Side::Server));

    sink.send(Frame::text("unmasked")).await?;
    let res = stream.next().await.expect("error");
    assert!(matches!(
        res,
        Err(WebSocketError::Protocol(ProtocolError::MaskRequired))
    ));
    Ok(())
}

#[tokio::test]
async fn test_max_frame_size() -> anyhow::Result<()> {
    let (client, server) = duplex(64);
    let mut sink = FramedWrite::new(server, Codec::new(Side::Server));
    let options = Options::default().with_max_frame_size(1024);
    let mut stream = FramedRead::new(client, Codec::with_options(Side::Client, &options));

    // only the header needs to arrive for the frame to be rejected
    let writer = tokio::spawn(async move {
        let _ = sink.send(Frame::binary(vec![0u8; 4096])).await;
    });

    let res = stream.next().await.expect("error");
    assert!(matches!(
        res,
        Err(WebSocketError::FrameTooLarge { length: 4096, max: 1024 })
    ));

    drop(stream);
    writer.await?;
    Ok(())
}
