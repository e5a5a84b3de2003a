//! Remote client for the directory node
//!
//! Used by storage servers, backup clients and the `backupdir` CLI. Each
//! method returns the same projected value the directory sends on the wire;
//! `Err` only means the request itself could not be completed.

use crate::common::{encode_transport, Error, NewFileRecord, Result, ServerId, UserId};
use crate::coordinator::http::{
    AddressResponse, AddressesResponse, BackupQuery, CreateAccountRequest, CredentialsResponse,
    ErrorResponse, HashesResponse, ListFilesRequest, ListFilesResponse, OkResponse, PathQuery,
    RecordFilesRequest, RegisterServerRequest, UsernameQuery,
};
use crate::coordinator::{Credentials, FileListing, ReplicaHash};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct DirectoryClient {
    base_url: String,
    http: Client,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(Error::Http(format!("{}: {}", status, message)));
        }
        Ok(resp.json::<T>().await?)
    }

    /// Next placement target, `""` when no server is registered
    pub async fn next_server(&self) -> Result<String> {
        let resp = self.http.get(self.url("/servers/next")).send().await?;
        Ok(Self::decode::<AddressResponse>(resp).await?.address)
    }

    /// Takes the raw hash and salt; they are base64 encoded for transport.
    pub async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
    ) -> Result<bool> {
        let req = CreateAccountRequest {
            username: username.to_string(),
            password_hash: encode_transport(password_hash),
            salt: encode_transport(salt),
        };
        let resp = self.http.post(self.url("/accounts")).json(&req).send().await?;
        Ok(Self::decode::<OkResponse>(resp).await?.ok)
    }

    pub async fn lookup_credentials(&self, username: &str) -> Result<Option<Credentials>> {
        let resp = self
            .http
            .get(self.url("/accounts"))
            .query(&UsernameQuery {
                username: username.to_string(),
            })
            .send()
            .await?;
        Ok(Self::decode::<CredentialsResponse>(resp).await?.credentials)
    }

    pub async fn active_servers_for(&self, user_id: UserId) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.url(&format!("/users/{}/servers", user_id)))
            .send()
            .await?;
        Ok(Self::decode::<AddressesResponse>(resp).await?.addresses)
    }

    pub async fn register_server(&self, server_id: ServerId, address: &str) -> Result<bool> {
        let req = RegisterServerRequest {
            server_id,
            address: address.to_string(),
        };
        let resp = self.http.post(self.url("/servers")).json(&req).send().await?;
        Ok(Self::decode::<OkResponse>(resp).await?.ok)
    }

    /// Fails with `Error::Http` if the directory could not complete the removal.
    pub async fn unregister_server(&self, server_id: ServerId) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/servers/{}", server_id)))
            .send()
            .await?;
        Self::decode::<serde_json::Value>(resp).await?;
        Ok(())
    }

    pub async fn record_files(&self, files: Vec<NewFileRecord>) -> Result<bool> {
        let req = RecordFilesRequest { files };
        let resp = self.http.post(self.url("/files")).json(&req).send().await?;
        Ok(Self::decode::<OkResponse>(resp).await?.ok)
    }

    pub async fn list_files(
        &self,
        user_id: UserId,
        prefixes: Vec<String>,
    ) -> Result<Vec<FileListing>> {
        let req = ListFilesRequest { prefixes };
        let resp = self
            .http
            .post(self.url(&format!("/users/{}/listing", user_id)))
            .json(&req)
            .send()
            .await?;
        Ok(Self::decode::<ListFilesResponse>(resp).await?.files)
    }

    pub async fn backup_servers_for(
        &self,
        requesting: ServerId,
        user_id: UserId,
        path: &str,
    ) -> Result<Vec<String>> {
        let query = BackupQuery {
            server_id: requesting,
            path: path.to_string(),
        };
        let resp = self
            .http
            .get(self.url(&format!("/users/{}/backups", user_id)))
            .query(&query)
            .send()
            .await?;
        Ok(Self::decode::<AddressesResponse>(resp).await?.addresses)
    }

    pub async fn remove_file(&self, user_id: UserId, path: &str) -> Result<bool> {
        let query = PathQuery {
            path: path.to_string(),
        };
        let resp = self
            .http
            .delete(self.url(&format!("/users/{}/files", user_id)))
            .query(&query)
            .send()
            .await?;
        Ok(Self::decode::<OkResponse>(resp).await?.ok)
    }

    /// Replica hashes, backups before the primary
    pub async fn hashes_for(&self, user_id: UserId, path: &str) -> Result<Vec<ReplicaHash>> {
        let query = PathQuery {
            path: path.to_string(),
        };
        let resp = self
            .http
            .get(self.url(&format!("/users/{}/hashes", user_id)))
            .query(&query)
            .send()
            .await?;
        Ok(Self::decode::<HashesResponse>(resp).await?.hashes)
    }

    /// Raw `/admin/status` document
    pub async fn status(&self) -> Result<serde_json::Value> {
        let resp = self.http.get(self.url("/admin/status")).send().await?;
        Self::decode(resp).await
    }
}
