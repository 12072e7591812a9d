use russh::client::Handler;
use russh::keys::PublicKeyBase64;
use tracing::{info, warn};

pub(crate) struct Client {
    pub allowed_fingerprints: Option<Vec<String>>, // OpenSSH SHA256 or raw base64 keys
}

impl Client {
    fn is_allowed(&self, fingerprint: &str, key_b64: &str) -> bool {
        match &self.allowed_fingerprints {
            Some(allowed) => allowed.iter().any(|s| s == fingerprint || s == key_b64),
            None => true,
        }
    }
}

impl Handler for Client {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fp_sha256 = server_public_key.fingerprint(russh::keys::HashAlg::Sha256).to_string();
        let key_b64 = server_public_key.public_key_base64();
        let ok = self.is_allowed(&fp_sha256, &key_b64);
        if self.allowed_fingerprints.is_none() {
            info!("server key fp sha256: {fp_sha256} (no allow-list configured)");
        } else if !ok {
            warn!("server key {fp_sha256} is not in host_fingerprints");
        }
        Ok(ok)
    }
}
