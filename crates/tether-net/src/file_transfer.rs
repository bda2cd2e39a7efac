//! Whole-file transfer over an established [`Transport`].

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use tether_shared::constants::MAX_FILE_SIZE;
use tether_shared::protocol::file_marker;
use tether_shared::FileBlob;

use crate::error::TransferError;
use crate::transport::{BlobFrame, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
    /// Sender name as carried inside the blob.
    pub sender: String,
}

/// Send the file at `path` as a marker line followed by its blob.
///
/// Size and type are checked from metadata before anything is read, and the
/// whole frame is encoded before the send lock is taken.
pub async fn send_file(
    transport: &Transport,
    path: &Path,
    local_name: &str,
    remote_name: &str,
) -> Result<SentFile, TransferError> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(TransferError::Io(e)),
    };
    if !meta.is_file() {
        return Err(TransferError::NotAFile(path.to_path_buf()));
    }
    check_size(meta.len())?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?
        .to_string();
    if name.contains(|c| c == '\n' || c == '\r') {
        return Err(TransferError::InvalidName(name));
    }

    let bytes = tokio::fs::read(path).await?;
    // The file may have grown since the metadata check.
    check_size(bytes.len() as u64)?;

    let blob = FileBlob::new(name.clone(), bytes, local_name, remote_name);
    let size = blob.size;
    let frame = BlobFrame::encode(&blob)?;
    drop(blob);

    {
        let mut sender = transport.sender().await;
        sender.send_line(&file_marker(&name)).await?;
        sender.send_frame(&frame).await?;
    }

    info!(name = %name, size, to = %remote_name, "File sent");
    Ok(SentFile {
        name,
        size,
        path: path.to_path_buf(),
    })
}

/// Read exactly one blob and write it into `destination_dir`.
///
/// Call this right after a file marker line has been read. An existing file
/// with the same name is overwritten.
pub async fn receive_file(
    transport: &Transport,
    destination_dir: &Path,
) -> Result<ReceivedFile, TransferError> {
    let blob = transport.receive_blob().await?;

    let name = sanitize_file_name(&blob.name)?;
    let path = destination_dir.join(&name);

    debug!(path = %path.display(), size = blob.size, "Writing received file");
    tokio::fs::write(&path, &blob.bytes).await?;

    info!(name = %name, size = blob.size, from = %blob.sender, "File received");
    Ok(ReceivedFile {
        name,
        size: blob.size,
        path,
        sender: blob.sender,
    })
}

/// Reduce a peer-supplied name to a bare file name.
pub fn sanitize_file_name(raw: &str) -> Result<String, TransferError> {
    let name = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(TransferError::InvalidName(raw.to_string()));
    }
    Ok(name.to_string())
}

fn check_size(size: u64) -> Result<(), TransferError> {
    if size > MAX_FILE_SIZE {
        return Err(TransferError::FileTooLarge {
            size,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use rand::RngCore;
    use tempfile::TempDir;

    use crate::error::TransportError;
    use crate::transport::TransportListener;

    async fn pair() -> (Transport, Transport) {
        let listener = TransportListener::bind((Ipv4Addr::LOCALHOST, 0).into())
            .await
            .unwrap();
        let port = listener.local_addr().port();
        let accept = tokio::spawn(listener.accept(Duration::from_secs(5)));
        let client = Transport::dial("127.0.0.1", port).await.unwrap();
        (accept.await.unwrap().unwrap(), client)
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\a.txt").unwrap(), "a.txt");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("dir/").is_err());
        assert!(sanitize_file_name("a/.").is_err());
    }

    #[tokio::test]
    async fn test_file_is_byte_identical() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        let mut contents = vec![0u8; 64 * 1024 + 7];
        rand::thread_rng().fill_bytes(&mut contents);
        let path = src.path().join("random.bin");
        std::fs::write(&path, &contents).unwrap();

        let (a, b) = pair().await;
        let sent = send_file(&a, &path, "alice", "bob").await.unwrap();
        assert_eq!(sent.size, contents.len() as u64);

        assert_eq!(
            b.receive_line().await.unwrap().as_deref(),
            Some("FILE:random.bin")
        );
        let received = receive_file(&b, dst.path()).await.unwrap();

        assert_eq!(received.name, "random.bin");
        assert_eq!(received.sender, "alice");
        assert_eq!(std::fs::read(&received.path).unwrap(), contents);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let path = src.path().join("empty.txt");
        std::fs::write(&path, b"").unwrap();

        let (a, b) = pair().await;
        send_file(&a, &path, "alice", "bob").await.unwrap();
        b.receive_line().await.unwrap();
        let received = receive_file(&b, dst.path()).await.unwrap();
        assert_eq!(received.size, 0);
        assert!(std::fs::read(&received.path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_file_is_overwritten() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let path = src.path().join("notes.txt");
        std::fs::write(&path, b"new contents").unwrap();
        std::fs::write(dst.path().join("notes.txt"), b"old").unwrap();

        let (a, b) = pair().await;
        send_file(&a, &path, "alice", "bob").await.unwrap();
        b.receive_line().await.unwrap();
        let received = receive_file(&b, dst.path()).await.unwrap();
        assert_eq!(std::fs::read(received.path).unwrap(), b"new contents");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_senders_keep_marker_and_blob_adjacent() {
        use std::collections::HashMap;
        use std::sync::Arc;

        const LINES: usize = 40;
        const FILES: usize = 6;

        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let mut expected = HashMap::new();
        for j in 0..FILES {
            let mut contents = vec![0u8; 96 * 1024 + j];
            rand::thread_rng().fill_bytes(&mut contents);
            let name = format!("part{j}.bin");
            std::fs::write(src.path().join(&name), &contents).unwrap();
            expected.insert(name, contents);
        }

        let (a, b) = pair().await;
        let a = Arc::new(a);

        let mut tasks = Vec::new();
        for i in 0..LINES {
            let a = a.clone();
            tasks.push(tokio::spawn(async move {
                a.send_line(&format!("line {i}")).await.unwrap();
            }));
        }
        for j in 0..FILES {
            let a = a.clone();
            let path = src.path().join(format!("part{j}.bin"));
            tasks.push(tokio::spawn(async move {
                send_file(&a, &path, "alice", "bob").await.unwrap();
            }));
        }

        let mut lines = Vec::new();
        let mut files = 0;
        while lines.len() < LINES || files < FILES {
            let line = b.receive_line().await.unwrap().expect("stream ended early");
            match line.strip_prefix("FILE:").map(str::to_string) {
                Some(name) => {
                    // The very next thing on the wire must be this file's blob.
                    let received = receive_file(&b, dst.path()).await.unwrap();
                    assert_eq!(received.name, name);
                    assert_eq!(
                        std::fs::read(&received.path).unwrap(),
                        expected[&name]
                    );
                    files += 1;
                }
                None => lines.push(line),
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        lines.sort_by_key(|l| l["line ".len()..].parse::<usize>().unwrap());
        let want: Vec<_> = (0..LINES).map(|i| format!("line {i}")).collect();
        assert_eq!(lines, want);
    }

    #[tokio::test]
    async fn test_missing_file_sends_nothing() {
        let (a, b) = pair().await;
        let err = send_file(&a, Path::new("/definitely/not/here.bin"), "alice", "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NotFound(_)));
        assert!(!err.is_fatal());

        a.send_line("still in sync").await.unwrap();
        assert_eq!(
            b.receive_line().await.unwrap().as_deref(),
            Some("still in sync")
        );
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let (a, _b) = pair().await;
        let err = send_file(&a, dir.path(), "alice", "bob").await.unwrap_err();
        assert!(matches!(err, TransferError::NotAFile(_)));
    }

    #[tokio::test]
    async fn test_send_on_closed_transport_is_fatal() {
        let src = TempDir::new().unwrap();
        let path = src.path().join("a.txt");
        std::fs::write(&path, b"abc").unwrap();

        let (a, _b) = pair().await;
        a.close().await;
        let err = send_file(&a, &path, "alice", "bob").await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Transport(TransportError::Closed)
        ));
        assert!(err.is_fatal());
    }
}
