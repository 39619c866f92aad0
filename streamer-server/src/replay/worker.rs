//! Replay worker - reads one recorded stream and sends it over UDP, paced by
//! the timestamp inside every record.

use log::{debug, error, info, log_enabled, trace, warn, Level};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use streamer_core::{Advance, ReplayCursor, StreamDescriptor, StreamId, Timestamp};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::network::{create_udp_sender, resolve_destination};

use super::{EndReason, ReplayError, ReplayReport, WorkerState};

/// Settings shared by all workers of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Host that receives the datagrams
    pub host: String,
    /// Discard the first record of the file before priming.
    ///
    /// Recordings made by the logger start with a record written before
    /// the device clock settled.
    pub skip_first_record: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            skip_first_record: true,
        }
    }
}

/// Replays one stream file to one UDP destination.
///
/// The worker owns its file and its socket; both are closed when [`run`]
/// returns, whatever the outcome.
///
/// [`run`]: ReplayWorker::run
pub struct ReplayWorker {
    path: PathBuf,
    descriptor: StreamDescriptor,
    options: WorkerOptions,
    state: WorkerState,
}

impl ReplayWorker {
    pub fn new(path: PathBuf, descriptor: StreamDescriptor, options: WorkerOptions) -> Self {
        Self {
            path,
            descriptor,
            options,
            state: WorkerState::Init,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        self.descriptor.id()
    }

    /// Replay the whole file, or until `cancel` fires.
    ///
    /// Failures are logged here and returned; they never panic and never
    /// touch other workers.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ReplayReport, ReplayError> {
        info!(
            "Replaying datastream {} from {} to {}:{}",
            self.descriptor.id(),
            self.path.display(),
            self.options.host,
            self.descriptor.destination_port()
        );

        let result = self.replay(&cancel).await;

        let id = self.descriptor.id().clone();
        match &result {
            Ok(report) => {
                self.set_state(WorkerState::Done);
                info!(
                    "Datastream {} finished ({:?}): {} records sent, {} epoch resets",
                    id, report.end, report.records_sent, report.epoch_resets
                );
            }
            Err(e @ (ReplayError::NotFound(_) | ReplayError::EmptyFile(_))) => {
                self.set_state(WorkerState::Failed);
                warn!("Datastream {}: {}", id, e);
            }
            Err(e) => {
                self.set_state(WorkerState::Failed);
                error!("Datastream {}: {}", id, e);
            }
        }
        result
    }

    async fn replay(&mut self, cancel: &CancellationToken) -> Result<ReplayReport, ReplayError> {
        let id = self.descriptor.id().clone();

        // Init
        let mut reader = self.open().await?;
        let socket = create_udp_sender()?;
        let destination =
            resolve_destination(&self.options.host, self.descriptor.destination_port()).await?;

        let record_size = self.descriptor.record_size();
        let mut current = vec![0u8; record_size];
        let mut next = vec![0u8; record_size];
        let mut offset = 0u64;

        // Primed: establish the first epoch
        self.set_state(WorkerState::Primed);
        if self.options.skip_first_record {
            offset += read_record(&mut reader, &mut next).await? as u64;
        }
        let len = read_record(&mut reader, &mut current).await?;
        let first = self.decode(offset, &current[..len])?;
        offset += len as u64;
        let mut cursor = ReplayCursor::prime(first, Instant::now(), offset);
        debug!(
            "Datastream {}: first timestamp {} (field {})",
            id,
            first,
            self.descriptor.timestamp_index()
        );

        let mut report = ReplayReport {
            stream_id: id.clone(),
            records_sent: 0,
            send_errors: 0,
            epoch_resets: 0,
            end: EndReason::EndOfFile,
        };

        // Running: `current` is decoded and waiting for its due time
        self.set_state(WorkerState::Running);
        loop {
            if !wait_until(cursor.due(), cancel).await {
                report.end = EndReason::Cancelled;
                break;
            }
            transmit(&socket, &current, destination, &mut report).await;
            if cancel.is_cancelled() {
                report.end = EndReason::Cancelled;
                break;
            }

            let len = read_record(&mut reader, &mut next).await?;
            if len < record_size {
                debug!(
                    "Datastream {}: end of file after offset {} ({} trailing bytes)",
                    id,
                    cursor.file_offset(),
                    len
                );
                break;
            }

            let timestamp = self.decode(cursor.file_offset(), &next)?;
            if log_enabled!(Level::Trace) {
                if let Ok(values) = self.descriptor.decode_named(&next) {
                    trace!("Datastream {}: {:?}", id, values);
                }
            }
            if let Advance::Reset { previous } =
                cursor.advance(timestamp, Instant::now(), len as u64)
            {
                self.set_state(WorkerState::Resetting);
                warn!(
                    "Device reset or timestamp overflow for datastream {} ({} after {}), resetting time",
                    id, timestamp, previous
                );
                self.set_state(WorkerState::Running);
            }
            std::mem::swap(&mut current, &mut next);
        }

        report.epoch_resets = cursor.resets();
        Ok(report)
    }

    async fn open(&self) -> Result<BufReader<File>, ReplayError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ReplayError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.len() == 0 {
            return Err(ReplayError::EmptyFile(self.path.clone()));
        }

        let file = File::open(&self.path).await?;
        Ok(BufReader::new(file))
    }

    fn decode(&self, offset: u64, record: &[u8]) -> Result<Timestamp, ReplayError> {
        self.descriptor
            .decode_timestamp(record)
            .map_err(|source| ReplayError::Decode {
                offset,
                data: record.to_vec(),
                source,
            })
    }

    fn set_state(&mut self, state: WorkerState) {
        debug!(
            "Datastream {}: {} -> {}",
            self.descriptor.id(),
            self.state,
            state
        );
        self.state = state;
    }
}

/// Fill `buf` from `reader`, returning fewer bytes only at end of file.
async fn read_record<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Sleep until `due`. Returns false if cancelled first.
async fn wait_until(due: Option<Instant>, cancel: &CancellationToken) -> bool {
    let Some(due) = due else {
        // Due beyond the end of time: only cancellation can end this wait
        cancel.cancelled().await;
        return false;
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep_until(tokio::time::Instant::from_std(due)) => true,
    }
}

/// Send errors are counted and logged, never returned.
async fn transmit(
    socket: &UdpSocket,
    record: &[u8],
    destination: SocketAddr,
    report: &mut ReplayReport,
) {
    match socket.send_to(record, destination).await {
        Ok(_) => {
            report.records_sent += 1;
            trace!(
                "Datastream {}: sent {} bytes to {}",
                report.stream_id,
                record.len(),
                destination
            );
        }
        Err(e) => {
            report.send_errors += 1;
            debug!(
                "Datastream {}: send to {} failed: {}",
                report.stream_id, destination, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use streamer_core::{DecodeError, RecordLayout};
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn descriptor(layout: &str, port: u16) -> StreamDescriptor {
        let layout = RecordLayout::parse(layout).unwrap();
        let keys = vec!["timestamp".to_string(), "seq".to_string()];
        StreamDescriptor::new("test".into(), layout, &keys, port).unwrap()
    }

    /// `<Qi` records: timestamp, then sequence number
    fn records(timestamps: &[u64]) -> Vec<u8> {
        let mut data = Vec::new();
        for (seq, ts) in timestamps.iter().enumerate() {
            data.extend_from_slice(&ts.to_le_bytes());
            data.extend_from_slice(&(seq as i32).to_le_bytes());
        }
        data
    }

    fn write_file(dir: &TempDir, data: &[u8]) -> PathBuf {
        let path = dir.path().join("test.bin");
        std::fs::write(&path, data).unwrap();
        path
    }

    fn options() -> WorkerOptions {
        WorkerOptions {
            host: "127.0.0.1".to_string(),
            skip_first_record: true,
        }
    }

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    /// Receive up to `count` datagrams, returning arrival time and sequence number
    async fn collect(socket: &UdpSocket, count: usize) -> Vec<(Instant, i32)> {
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while received.len() < count {
            match timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await {
                Ok(Ok((len, _))) => {
                    let seq = i32::from_le_bytes(buf[len - 4..len].try_into().unwrap());
                    received.push((Instant::now(), seq));
                }
                _ => break,
            }
        }
        received
    }

    async fn assert_silent(socket: &UdpSocket) {
        let mut buf = [0u8; 64];
        assert!(
            timeout(Duration::from_millis(150), socket.recv_from(&mut buf))
                .await
                .is_err(),
            "unexpected datagram"
        );
    }

    fn seqs(received: &[(Instant, i32)]) -> Vec<i32> {
        received.iter().map(|(_, seq)| *seq).collect()
    }

    fn gap(received: &[(Instant, i32)], i: usize) -> Duration {
        received[i + 1].0.duration_since(received[i].0)
    }

    fn assert_gap(actual: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            actual + Duration::from_millis(5) >= expected
                && actual <= expected + Duration::from_millis(40),
            "gap {:?}, expected about {:?}",
            actual,
            expected
        );
    }

    fn spawn_worker(
        path: PathBuf,
        descriptor: StreamDescriptor,
        options: WorkerOptions,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<ReplayReport, ReplayError>> {
        tokio::spawn(ReplayWorker::new(path, descriptor, options).run(cancel))
    }

    #[tokio::test]
    async fn test_paced_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            &records(&[5, 1_000_000, 1_050_000, 1_150_000, 1_200_000]),
        );
        let (socket, port) = receiver().await;

        let worker = spawn_worker(
            path,
            descriptor("<Qi", port),
            options(),
            CancellationToken::new(),
        );
        let received = collect(&socket, 4).await;
        let report = worker.await.unwrap().unwrap();

        // Record 0 is consumed by priming
        assert_eq!(seqs(&received), vec![1, 2, 3, 4]);
        assert_gap(gap(&received, 0), 50);
        assert_gap(gap(&received, 1), 100);
        assert_gap(gap(&received, 2), 50);

        assert_eq!(report.records_sent, 4);
        assert_eq!(report.epoch_resets, 0);
        assert_eq!(report.end, EndReason::EndOfFile);
        assert_silent(&socket).await;
    }

    #[tokio::test]
    async fn test_backwards_timestamp_resets_epoch() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            &records(&[0, 100_000, 200_000, 150_000, 250_000]),
        );
        let (socket, port) = receiver().await;

        let started = Instant::now();
        let worker = spawn_worker(
            path,
            descriptor("<Qi", port),
            options(),
            CancellationToken::new(),
        );
        let received = collect(&socket, 4).await;
        let report = worker.await.unwrap().unwrap();

        assert_eq!(seqs(&received), vec![1, 2, 3, 4]);
        assert_gap(gap(&received, 0), 100);
        // 150_000 after 200_000 goes out at once, from a fresh epoch
        assert_gap(gap(&received, 1), 0);
        assert_gap(gap(&received, 2), 100);
        assert_eq!(report.epoch_resets, 1);

        let total = received[3].0.duration_since(started);
        assert!(total >= Duration::from_millis(195), "total {:?}", total);
        assert!(total < Duration::from_millis(400), "total {:?}", total);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, &[]);
        let (socket, port) = receiver().await;

        let result = ReplayWorker::new(path, descriptor("<Qi", port), options())
            .run(CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ReplayError::EmptyFile(_))));
        assert_silent(&socket).await;
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let (socket, port) = receiver().await;

        let result = ReplayWorker::new(
            dir.path().join("nope.bin"),
            descriptor("<Qi", port),
            options(),
        )
        .run(CancellationToken::new())
        .await;

        assert!(matches!(result, Err(ReplayError::NotFound(_))));
        assert_silent(&socket).await;
    }

    #[tokio::test]
    async fn test_trailing_partial_record() {
        let dir = TempDir::new().unwrap();
        let mut data = records(&[0, 1_000, 2_000, 3_000]);
        data.extend_from_slice(&[0xAA; 5]);
        let path = write_file(&dir, &data);
        let (socket, port) = receiver().await;

        let worker = spawn_worker(
            path,
            descriptor("<Qi", port),
            options(),
            CancellationToken::new(),
        );
        let received = collect(&socket, 3).await;
        let report = worker.await.unwrap().unwrap();

        // floor(53 / 12) = 4 records, minus the skipped one
        assert_eq!(seqs(&received), vec![1, 2, 3]);
        assert_eq!(report.end, EndReason::EndOfFile);
        assert_silent(&socket).await;
    }

    #[tokio::test]
    async fn test_malformed_record_stops_stream() {
        let dir = TempDir::new().unwrap();
        let mut data = Vec::new();
        for (seq, ts) in [0.0f64, 1_000.0, 2_000.0, f64::NAN, 3_000.0]
            .iter()
            .enumerate()
        {
            data.extend_from_slice(&ts.to_le_bytes());
            data.extend_from_slice(&(seq as i32).to_le_bytes());
        }
        let path = write_file(&dir, &data);
        let (socket, port) = receiver().await;

        let worker = spawn_worker(
            path,
            descriptor("<di", port),
            options(),
            CancellationToken::new(),
        );
        let received = collect(&socket, 2).await;
        let result = worker.await.unwrap();

        assert_eq!(seqs(&received), vec![1, 2]);
        match result {
            Err(ReplayError::Decode {
                offset,
                data,
                source,
            }) => {
                assert_eq!(offset, 36);
                assert_eq!(data.len(), 12);
                assert!(matches!(source, DecodeError::NotFinite(_)));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
        assert_silent(&socket).await;
    }

    #[tokio::test]
    async fn test_single_record_fails_priming() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, &records(&[42]));
        let (socket, port) = receiver().await;

        let result = ReplayWorker::new(path, descriptor("<Qi", port), options())
            .run(CancellationToken::new())
            .await;

        match result {
            Err(ReplayError::Decode { source, .. }) => assert_eq!(
                source,
                DecodeError::SizeMismatch {
                    expected: 12,
                    actual: 0
                }
            ),
            other => panic!("expected decode error, got {:?}", other),
        }
        assert_silent(&socket).await;
    }

    #[tokio::test]
    async fn test_cancel_during_wait() {
        let dir = TempDir::new().unwrap();
        // Second record is due a minute after the first
        let path = write_file(&dir, &records(&[0, 0, 60_000_000]));
        let (socket, port) = receiver().await;

        let cancel = CancellationToken::new();
        let worker = spawn_worker(path, descriptor("<Qi", port), options(), cancel.clone());
        assert_eq!(seqs(&collect(&socket, 1).await), vec![1]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let report = timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker did not stop")
            .unwrap()
            .unwrap();

        assert_eq!(report.end, EndReason::Cancelled);
        assert_eq!(report.records_sent, 1);
        assert_silent(&socket).await;
    }

    #[tokio::test]
    async fn test_keep_first_record() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, &records(&[0, 1_000, 2_000]));
        let (socket, port) = receiver().await;

        let options = WorkerOptions {
            skip_first_record: false,
            ..options()
        };
        let worker = spawn_worker(
            path,
            descriptor("<Qi", port),
            options,
            CancellationToken::new(),
        );
        let received = collect(&socket, 3).await;
        worker.await.unwrap().unwrap();

        assert_eq!(seqs(&received), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_nobody_listening() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, &records(&[0, 1_000, 2_000, 3_000]));
        let port = {
            let (socket, port) = receiver().await;
            drop(socket);
            port
        };

        let report = ReplayWorker::new(path, descriptor("<Qi", port), options())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.records_sent + report.send_errors, 3);
        assert_eq!(report.end, EndReason::EndOfFile);
    }

    #[tokio::test]
    async fn test_read_record_short() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader = &data[..];
        let mut buf = [0u8; 4];
        assert_eq!(read_record(&mut reader, &mut buf).await.unwrap(), 4);
        assert_eq!(read_record(&mut reader, &mut buf).await.unwrap(), 1);
        assert_eq!(read_record(&mut reader, &mut buf).await.unwrap(), 0);
    }
}
