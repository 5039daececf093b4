mod keypair;
mod paths;

pub use keypair::{load_or_generate_identity, KeystoreError};
pub use paths::{default_data_dir, expand_path};
