use std::collections::BTreeMap;

use crate::{Error, Partition, PartitionSet, Result, Role};

/// Static mapping from role to readable partitions.
///
/// Built once at startup and shared read-only. Construction enforces the tier invariants:
/// every role reads `customer_kb`, only engineers and admins read `engineer_kb`, and only
/// admins read `admin_kb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
	rules: BTreeMap<Role, PartitionSet>,
}
impl AccessRule {
	pub fn new(rules: BTreeMap<Role, PartitionSet>) -> Result<Self> {
		for (role, partitions) in &rules {
			if !partitions.contains(&Partition::CustomerKb) {
				return Err(Error::InvalidAccessRule {
					message: format!("{role} must be able to read customer_kb."),
				});
			}
			if partitions.contains(&Partition::EngineerKb) && *role == Role::Customer {
				return Err(Error::InvalidAccessRule {
					message: "customer must not read engineer_kb.".to_string(),
				});
			}
			if partitions.contains(&Partition::AdminKb) && *role != Role::Admin {
				return Err(Error::InvalidAccessRule {
					message: format!("{role} must not read admin_kb."),
				});
			}
		}

		Ok(Self { rules })
	}

	pub fn from_config(access: &sage_config::Access) -> Result<Self> {
		let mut rules = BTreeMap::new();

		for (role, labels) in [
			(Role::Customer, &access.customer),
			(Role::Engineer, &access.engineer),
			(Role::Admin, &access.admin),
		] {
			let partitions =
				labels.iter().map(|label| label.parse()).collect::<Result<PartitionSet>>()?;

			rules.insert(role, partitions);
		}

		Self::new(rules)
	}

	/// Partitions `role` may query. Fails with `UnknownRole` when the rule set has no entry
	/// for the role.
	pub fn allowed_partitions(&self, role: Role) -> Result<&PartitionSet> {
		self.rules.get(&role).ok_or_else(|| Error::UnknownRole { role: role.to_string() })
	}

	/// Parses a role name and resolves it in one step.
	pub fn resolve(&self, role: &str) -> Result<(Role, &PartitionSet)> {
		let role: Role = role.parse()?;

		Ok((role, self.allowed_partitions(role)?))
	}
}
impl Default for AccessRule {
	fn default() -> Self {
		let mut rules = BTreeMap::new();

		rules.insert(Role::Customer, PartitionSet::from([Partition::CustomerKb]));
		rules.insert(
			Role::Engineer,
			PartitionSet::from([Partition::CustomerKb, Partition::EngineerKb]),
		);
		rules.insert(Role::Admin, PartitionSet::from(Partition::ALL));

		Self { rules }
	}
}
