use base64::{engine::general_purpose::STANDARD, Engine};
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};

use quorum_core::{Credentials, Error, Result};

pub const AUTHORIZATION: &str = "authorization";

pub fn authorization_value(credentials: &Credentials) -> String {
    match credentials {
        Credentials::Basic { username, password } => {
            format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
        }
        Credentials::Bearer(token) => format!("Bearer {}", token),
    }
}

/// Adds the `authorization` entry for `credentials`; leaves `metadata` alone when there are none.
pub fn apply_credentials(
    metadata: &mut MetadataMap,
    credentials: Option<&Credentials>,
) -> Result<()> {
    let Some(credentials) = credentials else {
        return Ok(());
    };

    let value: MetadataValue<Ascii> = MetadataValue::try_from(authorization_value(credentials))
        .map_err(|_| Error::InvalidArgument("credentials are not valid header text".into()))?;
    metadata.insert(AUTHORIZATION, value);
    Ok(())
}
