use anyhow::{anyhow, Result};

const KEYCHAIN_SERVICE: &str = "com.ferdash.app";
const KEYCHAIN_ACCOUNT: &str = "access_token";

/// Store the dashboard access token in the OS keychain.
///
/// The token is opaque to the session core; it is only handed to the
/// floating display so the secondary window can talk to the backend.
pub fn store_access_token(token: &str) -> Result<()> {
    log::info!("Storing access token (length: {})", token.len());

    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|e| anyhow!("Failed to create keyring entry: {}", e))?;
    entry
        .set_password(token)
        .map_err(|e| anyhow!("Failed to store access token in keyring: {}", e))?;
    Ok(())
}

/// Retrieve the access token from the OS keychain
pub fn get_access_token() -> Result<String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|e| anyhow!("Failed to create keyring entry: {}", e))?;
    entry
        .get_password()
        .map_err(|e| anyhow!("Failed to retrieve access token from keyring: {}", e))
}

/// Delete the access token from the OS keychain. Deleting a token that
/// was never stored is not an error.
pub fn delete_access_token() -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|e| anyhow!("Failed to create keyring entry: {}", e))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(anyhow!("Failed to delete access token from keyring: {}", e)),
    }
}

pub fn has_access_token() -> bool {
    get_access_token().is_ok()
}
