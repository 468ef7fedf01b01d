use std::{
	io::SeekFrom,
	path::{Path, PathBuf},
	sync::{Mutex, PoisonError},
};

use tokio::{
	fs::{File, OpenOptions},
	io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

use crate::{Error, Result};
use sage_domain::{BoxFuture, HistoryEntry};

/// Append-only log of completed queries.
pub trait HistoryStore
where
	Self: Send + Sync,
{
	fn record<'a>(&'a self, entry: &'a HistoryEntry) -> BoxFuture<'a, Result<()>>;

	/// Entries newest first.
	fn list<'a>(&'a self, limit: usize, offset: usize) -> BoxFuture<'a, Result<Vec<HistoryEntry>>>;
}

#[derive(Debug, Default)]
pub struct MemoryHistory {
	entries: Mutex<Vec<HistoryEntry>>,
}
impl MemoryHistory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl HistoryStore for MemoryHistory {
	fn record<'a>(&'a self, entry: &'a HistoryEntry) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.entries.lock().unwrap_or_else(PoisonError::into_inner).push(entry.clone());

			Ok(())
		})
	}

	fn list<'a>(&'a self, limit: usize, offset: usize) -> BoxFuture<'a, Result<Vec<HistoryEntry>>> {
		Box::pin(async move {
			let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

			Ok(entries.iter().rev().skip(offset).take(limit).cloned().collect())
		})
	}
}

/// History kept as one JSON object per line. Writes are serialized by an async lock so
/// concurrent queries never interleave partial lines.
#[derive(Debug)]
pub struct JsonlHistory {
	path: PathBuf,
	write_lock: tokio::sync::Mutex<()>,
}
impl JsonlHistory {
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref().to_path_buf();

		if let Some(parent) = path.parent()
			&& !parent.as_os_str().is_empty()
		{
			tokio::fs::create_dir_all(parent).await?;
		}

		OpenOptions::new().create(true).append(true).open(&path).await?;

		Ok(Self { path, write_lock: tokio::sync::Mutex::new(()) })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn append(&self, entry: &HistoryEntry) -> Result<()> {
		let mut line = serde_json::to_vec(entry)?;

		line.push(b'\n');

		let _guard = self.write_lock.lock().await;
		let mut file =
			OpenOptions::new().create(true).read(true).write(true).open(&self.path).await?;
		let end = self.intact_len(&mut file).await?;

		file.seek(SeekFrom::Start(end)).await?;

		if let Err(err) = write_line(&mut file, &line).await {
			// Leave the log as it was before this entry.
			if let Err(truncate_err) = file.set_len(end).await {
				tracing::error!(
					path = %self.path.display(),
					error = %truncate_err,
					"Failed to roll back a partial history write."
				);
			}

			return Err(err.into());
		}

		Ok(())
	}

	/// Length of the log up to its last complete line. A torn tail left by an interrupted
	/// append is cut off.
	async fn intact_len(&self, file: &mut File) -> Result<u64> {
		let len = file.metadata().await?.len();

		if len == 0 {
			return Ok(0);
		}

		let mut last = [0_u8; 1];

		file.seek(SeekFrom::End(-1)).await?;
		file.read_exact(&mut last).await?;

		if last[0] == b'\n' {
			return Ok(len);
		}

		let mut raw = Vec::new();

		file.seek(SeekFrom::Start(0)).await?;
		file.read_to_end(&mut raw).await?;

		let end = raw.iter().rposition(|byte| *byte == b'\n').map_or(0, |i| i as u64 + 1);

		tracing::warn!(
			path = %self.path.display(),
			dropped_bytes = len - end,
			"Dropping a torn history line."
		);

		file.set_len(end).await?;

		Ok(end)
	}

	async fn read_page(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
		let raw = {
			let _guard = self.write_lock.lock().await;

			tokio::fs::read_to_string(&self.path).await?
		};
		let torn_tail = !raw.is_empty() && !raw.ends_with('\n');
		let line_count = raw.lines().count();
		let mut entries: Vec<HistoryEntry> = Vec::new();

		for (index, line) in raw.lines().enumerate() {
			if line.trim().is_empty() {
				continue;
			}

			match serde_json::from_str(line) {
				Ok(entry) => entries.push(entry),
				// The next append cuts this line off.
				Err(_) if torn_tail && index + 1 == line_count => {
					tracing::warn!(path = %self.path.display(), "Skipping a torn history line.");
				},
				Err(err) => {
					return Err(Error::HistoryUnavailable {
						message: format!("{} line {}: {err}", self.path.display(), index + 1),
					});
				},
			}
		}

		Ok(entries.into_iter().rev().skip(offset).take(limit).collect())
	}
}
impl HistoryStore for JsonlHistory {
	fn record<'a>(&'a self, entry: &'a HistoryEntry) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.append(entry))
	}

	fn list<'a>(&'a self, limit: usize, offset: usize) -> BoxFuture<'a, Result<Vec<HistoryEntry>>> {
		Box::pin(self.read_page(limit, offset))
	}
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
	file.write_all(line).await?;
	file.flush().await
}
