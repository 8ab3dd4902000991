// src/exec/deferred.rs

//! Endpoints handed out before the process exists.
//!
//! `tokio::process` only creates the child's pipes at spawn time, while the
//! executor contract opens endpoints before `start`. A [`Deferred`] stream is
//! returned at open time and binds to the real pipe once `start` sends it
//! over a oneshot. If the sender is dropped (spawn failed), reads report
//! end-of-stream and writes report a broken pipe.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;

pub struct Deferred<T> {
    state: State<T>,
}

enum State<T> {
    Pending(oneshot::Receiver<T>),
    Bound(T),
    Closed,
}

/// Create a deferred stream and the sender that binds it.
pub fn deferred<T>() -> (oneshot::Sender<T>, Deferred<T>) {
    let (tx, rx) = oneshot::channel();
    (
        tx,
        Deferred {
            state: State::Pending(rx),
        },
    )
}

impl<T: Unpin> Deferred<T> {
    fn poll_bind(&mut self, cx: &mut Context<'_>) -> Poll<Option<&mut T>> {
        if let State::Pending(rx) = &mut self.state {
            self.state = match ready!(Pin::new(rx).poll(cx)) {
                Ok(io) => State::Bound(io),
                Err(_) => State::Closed,
            };
        }
        Poll::Ready(match &mut self.state {
            State::Bound(io) => Some(io),
            _ => None,
        })
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Deferred<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match ready!(self.get_mut().poll_bind(cx)) {
            Some(io) => Pin::new(io).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Deferred<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match ready!(self.get_mut().poll_bind(cx)) {
            Some(io) => Pin::new(io).poll_write(cx, buf),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "process was never started",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(self.get_mut().poll_bind(cx)) {
            Some(io) => Pin::new(io).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(self.get_mut().poll_bind(cx)) {
            Some(io) => Pin::new(io).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn reader_binds_after_open() {
        let (tx, mut reader) = deferred::<Cursor<Vec<u8>>>();
        let read = tokio::spawn(async move {
            let mut out = String::new();
            reader.read_to_string(&mut out).await.map(|_| out)
        });

        tx.send(Cursor::new(b"bound later".to_vec())).ok();
        assert_eq!(read.await.unwrap().unwrap(), "bound later");
    }

    #[tokio::test]
    async fn dropped_sender_means_end_of_stream() {
        let (tx, mut reader) = deferred::<Cursor<Vec<u8>>>();
        drop(tx);

        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_sender_means_broken_pipe_for_writers() {
        let (tx, mut writer) = deferred::<Vec<u8>>();
        drop(tx);

        let err = writer.write_all(b"abc").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        writer.shutdown().await.unwrap();
    }
}
