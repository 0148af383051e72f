//! Segment file access.

use tokio::fs::File;

use super::error::StreamError;
use super::paths::{OutputLayout, StreamId};

pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
pub const SEGMENT_CACHE_CONTROL: &str = "public, max-age=3600";

/// An opened segment ready to be streamed.
#[derive(Debug)]
pub struct SegmentFile {
    pub file: File,
    pub len: u64,
}

/// Opens segment files of a stream, rejecting names outside its namespace.
#[derive(Debug, Clone)]
pub struct SegmentServer {
    layout: OutputLayout,
}

impl SegmentServer {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub async fn serve(
        &self,
        stream_id: StreamId,
        file_name: &str,
    ) -> Result<SegmentFile, StreamError> {
        let not_found = || StreamError::NotFound(format!("Segment {file_name}"));
        let path = self
            .layout
            .segment_path(stream_id, file_name)
            .ok_or_else(not_found)?;

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(StreamError::Io(e)),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        Ok(SegmentFile {
            file,
            len: metadata.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::AsyncReadExt;

    fn id(raw: i64) -> StreamId {
        StreamId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn serves_existing_segment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stream_7_000.ts"), b"segment-bytes").unwrap();
        let server = SegmentServer::new(OutputLayout::new(dir.path()));

        let mut segment = server.serve(id(7), "stream_7_000.ts").await.unwrap();
        assert_eq!(segment.len, 13);

        let mut body = Vec::new();
        segment.file.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"segment-bytes");
    }

    #[tokio::test]
    async fn missing_and_foreign_segments_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stream_8_000.ts"), b"other").unwrap();
        let server = SegmentServer::new(OutputLayout::new(dir.path()));

        for name in ["stream_7_001.ts", "stream_8_000.ts", "../stream_7_000.ts", "..%2Fx.ts"] {
            assert!(
                matches!(server.serve(id(7), name).await, Err(StreamError::NotFound(_))),
                "{name} should be rejected"
            );
        }
    }

    proptest! {
        #[test]
        fn names_with_separators_never_resolve(
            prefix in "[a-z./\\\\]{0,6}",
            suffix in "[./\\\\]{1,4}",
        ) {
            let layout = OutputLayout::new("/srv/hls");
            let name = format!("{prefix}stream_7_000.ts{suffix}");
            prop_assert!(layout.segment_path(id(7), &name).is_none());

            let name = format!("{suffix}stream_7_000.ts");
            prop_assert!(layout.segment_path(id(7), &name).is_none());
        }
    }
}
