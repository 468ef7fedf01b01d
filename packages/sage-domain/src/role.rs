use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub type PartitionSet = BTreeSet<Partition>;

/// Who is asking. Fixed for the lifetime of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Customer,
	Engineer,
	Admin,
}
impl Role {
	pub const ALL: [Role; 3] = [Role::Customer, Role::Engineer, Role::Admin];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Customer => "customer",
			Self::Engineer => "engineer",
			Self::Admin => "admin",
		}
	}
}
impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Role {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"customer" => Ok(Self::Customer),
			"engineer" => Ok(Self::Engineer),
			"admin" => Ok(Self::Admin),
			_ => Err(Error::UnknownRole { role: raw.to_string() }),
		}
	}
}

/// A knowledge-base tier. Ordering follows the tier number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Partition {
	#[serde(rename = "customer_kb")]
	CustomerKb,
	#[serde(rename = "engineer_kb")]
	EngineerKb,
	#[serde(rename = "admin_kb", alias = "master_kb")]
	AdminKb,
}
impl Partition {
	pub const ALL: [Partition; 3] =
		[Partition::CustomerKb, Partition::EngineerKb, Partition::AdminKb];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::CustomerKb => "customer_kb",
			Self::EngineerKb => "engineer_kb",
			Self::AdminKb => "admin_kb",
		}
	}

	pub fn tier(self) -> u8 {
		match self {
			Self::CustomerKb => 1,
			Self::EngineerKb => 2,
			Self::AdminKb => 3,
		}
	}
}
impl fmt::Display for Partition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Partition {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"customer_kb" => Ok(Self::CustomerKb),
			"engineer_kb" => Ok(Self::EngineerKb),
			"admin_kb" | "master_kb" => Ok(Self::AdminKb),
			_ => Err(Error::UnknownPartition { partition: raw.to_string() }),
		}
	}
}
