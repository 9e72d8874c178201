// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON state file I/O.
//!
//! Writes go to a temp file in the target directory, are fsynced, then
//! renamed over the old file so a crash leaves either the old or the new
//! state on disk, never a torn one.

use std::io::{BufReader, ErrorKind, Write};
use std::path::Path;

use bastion_core::BastionError;
use tracing::debug;

use crate::state::LockdownState;

/// Read the state file. `Ok(None)` when it does not exist yet.
pub(crate) fn load(path: &Path) -> Result<Option<LockdownState>, BastionError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let state = serde_json::from_reader(BufReader::new(file))?;
    debug!(path = %path.display(), "lockdown state loaded");
    Ok(Some(state))
}

pub(crate) fn save(path: &Path, state: &LockdownState) -> Result<(), BastionError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, state)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BastionError::Io(e.error))?;

    debug!(path = %path.display(), mode = %state.mode, "lockdown state saved");
    Ok(())
}
