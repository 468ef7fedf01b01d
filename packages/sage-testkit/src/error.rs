pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] sage_config::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}
