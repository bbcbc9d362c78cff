//! Framed LSP messages over one accepted TCP stream.
//!
//! A reader thread decodes `Content-Length` framed messages into the
//! connection's receiver and a writer thread encodes everything sent on the
//! connection's sender. Framing itself is `lsp_server::Message::read` /
//! `write`.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::thread::JoinHandle;

use crossbeam_channel::{select, Receiver, Sender};
use lsp_server::{Connection, Message};
use lsp_types::notification::{Exit, Notification as _};
use tracing::debug;

use crate::error::ServerError;

/// The I/O threads of one socket connection.
pub struct TransportThreads {
    stream: TcpStream,
    reader: JoinHandle<std::io::Result<()>>,
    writer: JoinHandle<std::io::Result<()>>,
    stop_writer: Option<Sender<()>>,
}

/// Split `stream` into a [`Connection`] and the threads feeding it.
///
/// The reader stops after forwarding an `exit` notification or at end of
/// stream, which disconnects the connection's receiver.
pub fn socket_transport(stream: TcpStream) -> Result<(Connection, TransportThreads), ServerError> {
    let read_half = stream.try_clone()?;
    let write_half = stream.try_clone()?;
    let (reader_sender, reader_receiver) = crossbeam_channel::unbounded();
    let (writer_sender, writer_receiver) = crossbeam_channel::unbounded();
    let (stop_sender, stop_receiver) = crossbeam_channel::bounded(0);

    let reader = std::thread::Builder::new()
        .name("harbor-lsp-reader".into())
        .spawn(move || read_loop(read_half, reader_sender))?;
    let writer = std::thread::Builder::new()
        .name("harbor-lsp-writer".into())
        .spawn(move || write_loop(write_half, writer_receiver, stop_receiver))?;

    Ok((
        Connection {
            sender: writer_sender,
            receiver: reader_receiver,
        },
        TransportThreads {
            stream,
            reader,
            writer,
            stop_writer: Some(stop_sender),
        },
    ))
}

fn read_loop(stream: TcpStream, sender: Sender<Message>) -> std::io::Result<()> {
    let mut input = BufReader::new(stream);
    while let Some(msg) = Message::read(&mut input)? {
        let is_exit = matches!(&msg, Message::Notification(n) if n.method == Exit::METHOD);
        if sender.send(msg).is_err() || is_exit {
            break;
        }
    }
    debug!("transport reader finished");
    Ok(())
}

fn write_loop(
    stream: TcpStream,
    receiver: Receiver<Message>,
    stop: Receiver<()>,
) -> std::io::Result<()> {
    let mut output = BufWriter::new(stream);
    loop {
        select! {
            recv(receiver) -> msg => match msg {
                Ok(msg) => {
                    msg.write(&mut output)?;
                    output.flush()?;
                }
                Err(_) => break,
            },
            recv(stop) -> _ => {
                // Flush whatever the session queued before it ended.
                while let Ok(msg) = receiver.try_recv() {
                    msg.write(&mut output)?;
                }
                output.flush()?;
                break;
            }
        }
    }
    debug!("transport writer finished");
    Ok(())
}

impl TransportThreads {
    /// Drain pending output, close the socket and join both threads.
    pub fn close(mut self) -> Result<(), ServerError> {
        drop(self.stop_writer.take());
        let writer_result = join(self.writer);
        // Unblocks a reader still waiting on the socket.
        let _ = self.stream.shutdown(Shutdown::Both);
        let reader_result = join(self.reader);
        reader_result.and(writer_result)
    }
}

fn join(handle: JoinHandle<std::io::Result<()>>) -> Result<(), ServerError> {
    match handle.join() {
        Ok(result) => result.map_err(ServerError::Transport),
        Err(_) => Err(ServerError::Protocol("transport thread panicked".into())),
    }
}
