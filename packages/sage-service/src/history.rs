use serde::{Deserialize, Serialize};

use sage_domain::HistoryEntry;

use crate::{Error, Result, SageService};

const MAX_PAGE: u32 = 100;
const DEFAULT_PAGE: u32 = 20;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistoryRequest {
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub offset: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
	pub items: Vec<HistoryEntry>,
	pub limit: u32,
	pub offset: u32,
}

impl SageService {
	/// Recorded queries, newest first.
	pub async fn history(&self, req: HistoryRequest) -> Result<HistoryResponse> {
		let limit = req.limit.unwrap_or(DEFAULT_PAGE);
		let offset = req.offset.unwrap_or(0);

		if !(1..=MAX_PAGE).contains(&limit) {
			return Err(Error::InvalidRequest {
				message: format!("limit must be between 1 and {MAX_PAGE}."),
			});
		}

		let items = self
			.history
			.list(limit as usize, offset as usize)
			.await
			.map_err(|err| Error::HistoryUnavailable { message: err.to_string() })?;

		Ok(HistoryResponse { items, limit, offset })
	}

	pub(crate) async fn record_history(&self, entry: &HistoryEntry) -> Result<()> {
		self.history
			.record(entry)
			.await
			.map_err(|err| Error::HistoryUnavailable { message: err.to_string() })
	}
}
