#![cfg(unix)]

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use execrelay_frame::{ExecRequest, ExecResponse, FrameReader, FrameWriter};
use execrelay_stream::{stream_to_exec_options, ExecOptions, SerializedSender, TerminalSize};

/// Stand-in process engine: upper-cases stdin onto stdout, reports resizes on
/// stderr, and exits with the number of bytes it read.
fn run_engine(options: ExecOptions) -> i32 {
    let ExecOptions {
        mut stdin,
        mut stdout,
        mut stderr,
        resize,
        ..
    } = options;

    let resizes = thread::spawn(move || resize.iter().collect::<Vec<TerminalSize>>());

    let mut input = Vec::new();
    stdin.read_to_end(&mut input).unwrap();
    stdout.write_all(&input.to_ascii_uppercase()).unwrap();
    stdout.close();

    for size in resizes.join().unwrap() {
        writeln!(stderr, "resize {}x{}", size.width, size.height).unwrap();
    }
    stderr.close();

    input.len() as i32
}

#[test]
fn full_session_over_socket_pair() {
    let (client, server) = UnixStream::pair().unwrap();

    let executor = thread::spawn(move || {
        let mut reader = FrameReader::new(server.try_clone().unwrap());
        let setup = reader.read_message::<ExecRequest>().unwrap().setup.unwrap();

        let sender = SerializedSender::new(FrameWriter::new(server));
        let (options, done) =
            stream_to_exec_options(setup.command, setup.tty, reader, sender.clone()).unwrap();

        let code = run_engine(options);
        done.recv().unwrap().unwrap();
        sender.send_exit(code).unwrap();
    });

    let mut writer = FrameWriter::new(client.try_clone().unwrap());
    writer
        .write_message(&ExecRequest::setup(vec!["upper".into()], true))
        .unwrap();
    writer.write_message(&ExecRequest::tty_size(24, 80)).unwrap();
    writer.write_message(&ExecRequest::stdin(&b"hello, "[..])).unwrap();
    writer.write_message(&ExecRequest::heartbeat()).unwrap();
    writer.write_message(&ExecRequest::stdin(&b"world"[..])).unwrap();
    writer.write_message(&ExecRequest::stdin_close()).unwrap();
    // Ends the inbound stream so the resize queue closes.
    client.shutdown(std::net::Shutdown::Write).unwrap();

    let mut reader = FrameReader::new(client);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut closes = (0, 0);
    let exit_code = loop {
        let msg: ExecResponse = reader.read_message().unwrap();
        if let Some(op) = msg.stdout {
            assert_eq!(closes.0, 0, "stdout data after close");
            stdout.extend_from_slice(&op.data);
            closes.0 += usize::from(op.close);
        }
        if let Some(op) = msg.stderr {
            assert_eq!(closes.1, 0, "stderr data after close");
            stderr.extend_from_slice(&op.data);
            closes.1 += usize::from(op.close);
        }
        if let Some(exit) = msg.exit {
            break exit.exit_code;
        }
    };

    executor.join().unwrap();
    assert_eq!(stdout, b"HELLO, WORLD");
    assert_eq!(String::from_utf8(stderr).unwrap(), "resize 80x24\n");
    assert_eq!(closes, (1, 1));
    assert_eq!(exit_code, 12);
}

#[test]
fn large_output_is_split_into_bounded_frames() {
    let (client, server) = UnixStream::pair().unwrap();
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 200) as u8).collect();
    let expected = payload.clone();

    let executor = thread::spawn(move || {
        let reader = FrameReader::new(server.try_clone().unwrap());
        let sender = SerializedSender::new(FrameWriter::new(server));
        let (options, done) =
            stream_to_exec_options(vec!["dump".into()], false, reader, sender.clone()).unwrap();

        let mut stdout = options.stdout;
        stdout.write_all(&payload).unwrap();
        drop(stdout);
        drop(options.stderr);

        done.recv().unwrap().unwrap();
        sender.send_exit(0).unwrap();
    });

    let mut reader = FrameReader::new(client);
    let mut received = Vec::new();
    loop {
        let msg: ExecResponse = reader.read_message().unwrap();
        if let Some(op) = msg.stdout {
            assert!(op.data.len() <= execrelay_stream::STREAM_CHUNK_SIZE);
            received.extend_from_slice(&op.data);
        }
        if msg.exit.is_some() {
            break;
        }
    }

    executor.join().unwrap();
    assert_eq!(received, expected);
}
