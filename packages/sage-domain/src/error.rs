pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("Unknown role {role:?}.")]
	UnknownRole { role: String },
	#[error("Unknown partition {partition:?}.")]
	UnknownPartition { partition: String },
	#[error("Access rule violates tier invariants: {message}")]
	InvalidAccessRule { message: String },
}
