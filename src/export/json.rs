use std::io::Write;

use crate::state::ResultSnapshot;

/// Export snapshot as pretty-printed JSON
pub fn export_json<W: Write>(snapshot: &ResultSnapshot, writer: W) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, snapshot)
}
