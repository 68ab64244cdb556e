use crate::error::{BigQueryError, Result};

/// Ask the local gcloud SDK for an OAuth access token for the active account.
pub async fn gcloud_access_token() -> Result<String> {
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| BigQueryError::Auth(format!("failed to run gcloud: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BigQueryError::Auth(format!(
            "gcloud auth print-access-token exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(BigQueryError::Auth(
            "gcloud returned an empty access token".to_string(),
        ));
    }
    Ok(token)
}
