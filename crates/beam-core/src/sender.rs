//! Sender side of the chunked transfer engine
//!
//! A file of `S` bytes is split into `ceil(S / chunk_size)` chunks and sent
//! strictly in index order over a [`PeerLink`], followed by a terminal `end`
//! marker. Chunks are read from the source lazily, one at a time, so only the
//! current chunk is ever resident. Fanning out to several recipients runs one
//! independent send sequence per link.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::TransferError;
use crate::protocol::TransferMessage;
use crate::DEFAULT_CHUNK_SIZE;

/// One direction of a peer-to-peer data channel, as seen by the sender.
///
/// The engine never opens connections itself; the application hands it a
/// link per recipient. Delivery failure means the channel is gone and the
/// transfer is abandoned — nothing is retried.
#[async_trait]
pub trait PeerLink: Send {
    async fn deliver(&mut self, msg: TransferMessage) -> Result<(), TransferError>;
}

/// An in-process channel works as a link directly. A bounded channel gives
/// the engine backpressure-based pacing; the transport task on the other end
/// drains it onto the real data channel.
#[async_trait]
impl PeerLink for mpsc::Sender<TransferMessage> {
    async fn deliver(&mut self, msg: TransferMessage) -> Result<(), TransferError> {
        self.send(msg).await.map_err(|_| TransferError::ChannelClosed)
    }
}

/// Tuning knobs for a send
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Chunk size in bytes
    pub chunk_size: usize,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SendOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl From<&crate::config::TransferConfig> for SendOptions {
    fn from(config: &crate::config::TransferConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
        }
    }
}

/// Progress of one recipient's send sequence during a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendProgress {
    /// Index of the recipient in the fan-out list
    pub recipient: usize,
    /// Percent of source bytes delivered, 0..=100
    pub percent: u8,
}

/// Send one file over one link.
///
/// Progress percentages (`floor(bytes_sent / S * 100)`, recomputed after
/// every chunk) are pushed on `progress` if given; 100 is reached exactly at
/// the final chunk, before the `end` marker.
pub async fn send_file<L: PeerLink>(
    path: &Path,
    link: &mut L,
    opts: &SendOptions,
    progress: Option<&mpsc::UnboundedSender<u8>>,
) -> Result<(), TransferError> {
    send_chunks(path, link, opts.chunk_size, |percent| {
        if let Some(tx) = progress {
            let _ = tx.send(percent);
        }
    })
    .await
}

/// Send one file to every link, one independent sequence per recipient.
///
/// Returns only once every recipient's sequence has delivered its `end`
/// marker; if any sequence fails, the remaining ones still run to completion
/// and the first error is returned.
pub async fn send_file_to_all<L>(
    path: &Path,
    links: Vec<L>,
    opts: SendOptions,
    progress: Option<mpsc::UnboundedSender<SendProgress>>,
) -> Result<(), TransferError>
where
    L: PeerLink + 'static,
{
    let mut tasks = tokio::task::JoinSet::new();
    for (recipient, mut link) in links.into_iter().enumerate() {
        let path = path.to_path_buf();
        let progress = progress.clone();
        tasks.spawn(async move {
            send_chunks(&path, &mut link, opts.chunk_size, |percent| {
                if let Some(tx) = &progress {
                    let _ = tx.send(SendProgress { recipient, percent });
                }
            })
            .await
        });
    }

    let mut first_err = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_err.get_or_insert(e);
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => {
                first_err.get_or_insert(TransferError::ChannelClosed);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn send_chunks<L: PeerLink>(
    path: &Path,
    link: &mut L,
    chunk_size: usize,
    mut on_progress: impl FnMut(u8) + Send,
) -> Result<(), TransferError> {
    let chunk_size = chunk_size.max(1);
    let size = tokio::fs::metadata(path).await?.len();
    if size == 0 {
        return Err(TransferError::EmptySource(path.to_path_buf()));
    }

    let total_chunks = size.div_ceil(chunk_size as u64) as u32;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());

    let mut file = File::open(path).await?;
    let mut sent: u64 = 0;

    for index in 0..total_chunks {
        let want = chunk_size.min((size - sent) as usize);
        let mut chunk = vec![0u8; want];
        file.read_exact(&mut chunk).await?;

        link.deliver(TransferMessage::Chunk {
            index,
            total_chunks,
            file_name: file_name.clone(),
            chunk,
        })
        .await?;

        sent += want as u64;
        let percent = ((sent * 100) / size) as u8;
        on_progress(percent);
        debug!(file = %file_name, index, total_chunks, percent, "chunk sent");
    }

    link.deliver(TransferMessage::End {
        file_name: file_name.clone(),
    })
    .await?;

    info!(file = %file_name, chunks = total_chunks, bytes = size, "send sequence complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn temp_source(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    async fn collect_send(
        bytes: &[u8],
        chunk_size: usize,
    ) -> (Vec<TransferMessage>, Vec<u8>) {
        let src = temp_source(bytes);
        let (tx, mut rx) = mpsc::channel(1024);
        let (ptx, mut prx) = mpsc::unbounded_channel();

        let mut link = tx;
        send_file(
            src.path(),
            &mut link,
            &SendOptions::with_chunk_size(chunk_size),
            Some(&ptx),
        )
        .await
        .unwrap();
        drop(link);

        let mut msgs = Vec::new();
        while let Some(m) = rx.recv().await {
            msgs.push(m);
        }
        let mut reports = Vec::new();
        while let Ok(p) = prx.try_recv() {
            reports.push(p);
        }
        (msgs, reports)
    }

    #[tokio::test]
    async fn test_split_sizes_and_order() {
        let data = patterned(2_500_000);
        let (msgs, _) = collect_send(&data, 1_000_000).await;

        // 3 chunks then the end marker
        assert_eq!(msgs.len(), 4);
        for (i, msg) in msgs.iter().take(3).enumerate() {
            match msg {
                TransferMessage::Chunk {
                    index,
                    total_chunks,
                    chunk,
                    ..
                } => {
                    assert_eq!(*index, i as u32);
                    assert_eq!(*total_chunks, 3);
                    let expected = if i < 2 { 1_000_000 } else { 500_000 };
                    assert_eq!(chunk.len(), expected);
                }
                _ => panic!("expected chunk at position {}", i),
            }
        }
        assert!(matches!(&msgs[3], TransferMessage::End { .. }));
    }

    #[tokio::test]
    async fn test_progress_monotonic_and_complete() {
        let data = patterned(2_500_000);
        let (_, reports) = collect_send(&data, 1_000_000).await;

        assert_eq!(reports, vec![40, 80, 100]);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_empty_source_rejected() {
        let src = temp_source(&[]);
        let (tx, _rx) = mpsc::channel(8);
        let mut link = tx;
        let err = send_file(src.path(), &mut link, &SendOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::EmptySource(_)));
    }

    #[tokio::test]
    async fn test_closed_link_aborts() {
        let src = temp_source(&patterned(4096));
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut link = tx;
        let err = send_file(src.path(), &mut link, &SendOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_fanout_completes_every_recipient() {
        let data = patterned(300_000);
        let src = temp_source(&data);

        let (tx_a, mut rx_a) = mpsc::channel(64);
        let (tx_b, mut rx_b) = mpsc::channel(64);
        let (ptx, mut prx) = mpsc::unbounded_channel();

        send_file_to_all(
            src.path(),
            vec![tx_a, tx_b],
            SendOptions::with_chunk_size(100_000),
            Some(ptx),
        )
        .await
        .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let mut count = 0;
            let mut saw_end = false;
            while let Some(msg) = rx.recv().await {
                match msg {
                    TransferMessage::Chunk { .. } => count += 1,
                    TransferMessage::End { .. } => saw_end = true,
                }
            }
            assert_eq!(count, 3);
            assert!(saw_end);
        }

        // both recipients reported reaching 100
        let mut done = [false, false];
        while let Ok(p) = prx.try_recv() {
            if p.percent == 100 {
                done[p.recipient] = true;
            }
        }
        assert_eq!(done, [true, true]);
    }
}
