//! Manifest rewriting for HTTP delivery.

use super::paths::StreamId;

/// Route prefix under which segments are served.
pub const DEFAULT_DELIVERY_PREFIX: &str = "/api/stream/hls";

/// Rewrites relative segment references into stream-scoped delivery URLs.
#[derive(Debug, Clone)]
pub struct ManifestRewriter {
    prefix: String,
}

impl Default for ManifestRewriter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIVERY_PREFIX)
    }
}

impl ManifestRewriter {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Rewrite every relative `.ts` reference in `manifest`.
    ///
    /// Directives and absolute references pass through. Line endings are
    /// preserved, and rewriting an already rewritten manifest is a no-op.
    pub fn rewrite(&self, manifest: &str, stream_id: StreamId) -> String {
        let mut out = String::with_capacity(manifest.len() + 256);
        for line in manifest.split_inclusive('\n') {
            let (body, ending) = split_line_ending(line);
            if is_relative_segment(body) {
                out.push_str(&self.prefix);
                out.push('/');
                out.push_str(&stream_id.to_string());
                out.push('/');
                out.push_str(body.trim());
            } else {
                out.push_str(body);
            }
            out.push_str(ending);
        }
        out
    }
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn is_relative_segment(line: &str) -> bool {
    let line = line.trim();
    !line.starts_with('#')
        && line.ends_with(".ts")
        && !line.starts_with("http://")
        && !line.starts_with("https://")
        && !line.starts_with('/')
}
