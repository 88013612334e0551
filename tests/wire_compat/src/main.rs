fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use filedrop_data_channel::wire::{HEADER_LEN, Metadata, read_chunk_header, read_metadata};
    use filedrop_data_channel::{DataChannelError, TcpDataClient, TcpDataServer, Unit};
    use filedrop_transfer::checksum_bytes;
    use serde::Deserialize;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// Expected layout of a fixture stream.
    #[derive(Debug, Deserialize)]
    struct StreamManifest {
        file: String,
        chunk_size: usize,
        size: u64,
        stream: String,
        chunks: Vec<ChunkEntry>,
    }

    #[derive(Debug, Deserialize)]
    struct ChunkEntry {
        len: u64,
        md5: String,
    }

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_bytes(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_manifest(name: &str) -> StreamManifest {
        let data = load_bytes(name);
        serde_json::from_slice(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    /// Feeds a fixture stream through a receive session.
    async fn receive_fixture(
        stream: &[u8],
    ) -> (
        tempfile::TempDir,
        Result<filedrop_data_channel::ReceiveReport, DataChannelError>,
    ) {
        let dest = tempfile::tempdir().unwrap();
        let server = TcpDataServer::new(dest.path().to_path_buf(), CancellationToken::new());
        let (tx, _rx) = mpsc::channel(64);
        let mut reader = stream;
        let result = server.receive_session(&mut reader, peer(), &tx).await;
        (dest, result)
    }

    #[tokio::test]
    async fn encoder_matches_fixture() {
        let manifest = load_manifest("hello.json");
        let expected = load_bytes(&manifest.stream);

        let client = TcpDataClient::new(manifest.chunk_size).unwrap();
        let (tx, _rx) = mpsc::channel(64);
        let mut wire = Vec::new();
        let report = client
            .send_to(&fixtures_dir().join(&manifest.file), &mut wire, &tx)
            .await
            .unwrap();

        assert_eq!(report.chunks_sent, manifest.chunks.len() as u64);
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn fixture_headers_decode() {
        let manifest = load_manifest("hello.json");
        let stream = load_bytes(&manifest.stream);
        let mut reader = &stream[..];

        let metadata = read_metadata(&mut reader).await.unwrap();
        assert_eq!(
            metadata,
            Metadata {
                name: manifest.file.clone(),
                size: manifest.size
            }
        );

        for (index, entry) in manifest.chunks.iter().enumerate() {
            let header = read_chunk_header(&mut reader, index as u64)
                .await
                .unwrap()
                .expect("chunk header");
            assert_eq!(header.payload_len, entry.len);
            assert_eq!(hex::encode(header.checksum), entry.md5);

            let (payload, rest) = reader.split_at(entry.len as usize);
            assert_eq!(hex::encode(checksum_bytes(payload)), entry.md5);
            reader = rest;
        }

        assert!(read_chunk_header(&mut reader, manifest.chunks.len() as u64)
            .await
            .unwrap()
            .is_none());
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn decoder_reproduces_fixture_file() {
        let manifest = load_manifest("hello.json");
        let (dest, result) = receive_fixture(&load_bytes(&manifest.stream)).await;

        let report = result.unwrap();
        assert!(report.is_verified());
        assert_eq!(report.chunks, 3);
        assert_eq!(report.path, dest.path().join("hello.txt"));
        assert_eq!(fs::read(&report.path).unwrap(), load_bytes(&manifest.file));
    }

    #[tokio::test]
    async fn corrupted_fixture_flags_chunk() {
        let (_dest, result) = receive_fixture(&load_bytes("hello_corrupt.stream")).await;

        let report = result.unwrap();
        assert_eq!(report.mismatched_chunks, vec![1]);
        assert_eq!(report.bytes_received, 17);
        assert!(!report.is_verified());
    }

    #[tokio::test]
    async fn truncated_fixture_aborts() {
        let (dest, result) = receive_fixture(&load_bytes("hello_truncated.stream")).await;

        match result {
            Err(DataChannelError::TruncatedStream {
                unit,
                expected,
                received,
            }) => {
                assert_eq!(unit, Unit::ChunkHeader(2));
                assert_eq!(expected, 26);
                assert_eq!(received, 22);
            }
            other => panic!("expected truncation, got {other:?}"),
        }

        // The chunks before the cut stay on disk.
        let partial = fs::read(dest.path().join("hello.txt")).unwrap();
        assert_eq!(partial, &load_bytes("hello.txt")[..16]);
    }

    #[tokio::test]
    async fn empty_file_fixture() {
        let stream = load_bytes("empty.stream");
        assert_eq!(stream, b"0000000011empty.txt|00000000000");
        assert_eq!(&stream[stream.len() - HEADER_LEN..], b"0000000000");

        let (_dest, result) = receive_fixture(&stream).await;
        let report = result.unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(report.bytes_received, 0);
        assert!(report.is_verified());
        assert!(fs::read(&report.path).unwrap().is_empty());
    }
}
