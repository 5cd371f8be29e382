use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, instrument};

use super::{Channel, PublishError};
use crate::config::{self, Vk};
use crate::model::ChannelKind;

const VK_API_BASE: &str = "https://api.vk.com/method/";

#[derive(Clone)]
struct VkCredentials {
    token: String,
    group_id: String,
}

/// Posts to a VK community wall, uploading the preview as a wall photo.
#[derive(Clone)]
pub struct VkChannel {
    http: Client,
    base_url: Url,
    api_version: String,
    credentials: Option<VkCredentials>,
}

impl fmt::Debug for VkChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VkChannel")
            .field("base_url", &self.base_url)
            .field("configured", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl VkChannel {
    pub fn from_config(http: Client, cfg: &Vk) -> Result<Self> {
        let base_url = Url::parse(VK_API_BASE).context("invalid VK API URL")?;
        Ok(Self::with_base_url(http, cfg, base_url))
    }

    pub fn with_base_url(http: Client, cfg: &Vk, base_url: Url) -> Self {
        let credentials = match (
            config::credential(&cfg.group_token),
            config::credential(&cfg.group_id),
        ) {
            (Some(token), Some(group_id)) => Some(VkCredentials {
                token: token.to_string(),
                group_id: group_id.trim_start_matches('-').to_string(),
            }),
            _ => None,
        };
        Self {
            http,
            base_url,
            api_version: cfg.api_version.clone(),
            credentials,
        }
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        self.base_url
            .join(method)
            .with_context(|| format!("invalid VK method {}", method))
    }

    async fn upload_photo(&self, creds: &VkCredentials, image: &[u8]) -> Result<String> {
        let server: Value = self
            .http
            .get(self.method_url("photos.getWallUploadServer")?)
            .query(&[
                ("group_id", creds.group_id.as_str()),
                ("v", self.api_version.as_str()),
                ("access_token", creds.token.as_str()),
            ])
            .send()
            .await
            .context("failed to reach photos.getWallUploadServer")?
            .error_for_status()?
            .json()
            .await
            .context("invalid photos.getWallUploadServer response")?;
        let upload_url = api_response(&server)?["upload_url"]
            .as_str()
            .ok_or_else(|| anyhow!("upload_url missing"))?
            .to_string();

        let form = reqwest::multipart::Form::new().part(
            "photo",
            reqwest::multipart::Part::bytes(image.to_vec())
                .file_name("image.jpg")
                .mime_str("image/jpeg")?,
        );
        let uploaded: Value = self
            .http
            .post(&upload_url)
            .multipart(form)
            .send()
            .await
            .context("failed to upload photo")?
            .error_for_status()?
            .json()
            .await
            .context("invalid photo upload response")?;
        let (photo, server, hash) = uploaded_photo(&uploaded)?;
        debug!("photo uploaded");

        let saved: Value = self
            .http
            .get(self.method_url("photos.saveWallPhoto")?)
            .query(&[
                ("group_id", creds.group_id.as_str()),
                ("photo", photo.as_str()),
                ("server", server.as_str()),
                ("hash", hash.as_str()),
                ("v", self.api_version.as_str()),
                ("access_token", creds.token.as_str()),
            ])
            .send()
            .await
            .context("failed to reach photos.saveWallPhoto")?
            .error_for_status()?
            .json()
            .await
            .context("invalid photos.saveWallPhoto response")?;
        attachment_from_saved(api_response(&saved)?)
    }

    async fn wall_post(
        &self,
        creds: &VkCredentials,
        text: &str,
        attachment: Option<&str>,
    ) -> Result<()> {
        let params = wall_post_params(
            &creds.group_id,
            &creds.token,
            &self.api_version,
            text,
            attachment,
        );
        let body: Value = self
            .http
            .post(self.method_url("wall.post")?)
            .form(&params)
            .send()
            .await
            .context("failed to reach wall.post")?
            .error_for_status()?
            .json()
            .await
            .context("invalid wall.post response")?;
        api_response(&body)?;
        Ok(())
    }
}

#[async_trait]
impl Channel for VkChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Vk
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    #[instrument(skip_all, fields(with_image = image.is_some()))]
    async fn send(&self, text: &str, image: Option<&[u8]>) -> Result<(), PublishError> {
        let Some(creds) = &self.credentials else {
            return Err(PublishError::CredentialsMissing);
        };
        let attachment = match image {
            Some(bytes) => Some(self.upload_photo(creds, bytes).await?),
            None => None,
        };
        self.wall_post(creds, text, attachment.as_deref()).await?;
        info!("vk post sent");
        Ok(())
    }
}

/// Unwrap a VK API envelope: `{"response": …}` on success, `{"error": …}`
/// otherwise. VK reports most failures with HTTP 200.
pub fn api_response(body: &Value) -> Result<&Value> {
    if let Some(err) = body.get("error") {
        let code = err["error_code"].as_i64().unwrap_or_default();
        let msg = err["error_msg"].as_str().unwrap_or("unknown error");
        return Err(anyhow!("vk error {}: {}", code, msg));
    }
    match body.get("response") {
        Some(resp) if !resp.is_null() => Ok(resp),
        _ => Err(anyhow!("vk response envelope missing")),
    }
}

/// `(photo, server, hash)` from the upload server's reply. An empty photo
/// list means VK rejected the file.
fn uploaded_photo(body: &Value) -> Result<(String, String, String)> {
    if let Some(err) = body.get("error") {
        return Err(anyhow!("photo upload rejected: {}", err));
    }
    let photo = body["photo"].as_str().unwrap_or_default();
    if photo.is_empty() || photo == "[]" {
        return Err(anyhow!("photo upload returned no photo"));
    }
    let server = match &body["server"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Err(anyhow!("photo upload returned no server")),
    };
    let hash = body["hash"]
        .as_str()
        .ok_or_else(|| anyhow!("photo upload returned no hash"))?;
    Ok((photo.to_string(), server, hash.to_string()))
}

/// `photo{owner_id}_{id}` attachment reference for the first saved photo.
pub fn attachment_from_saved(response: &Value) -> Result<String> {
    let saved = response
        .get(0)
        .ok_or_else(|| anyhow!("saveWallPhoto returned no photos"))?;
    let owner = saved["owner_id"]
        .as_i64()
        .ok_or_else(|| anyhow!("saved photo has no owner_id"))?;
    let id = saved["id"]
        .as_i64()
        .ok_or_else(|| anyhow!("saved photo has no id"))?;
    Ok(format!("photo{}_{}", owner, id))
}

/// Form fields for `wall.post` on behalf of the community.
pub fn wall_post_params(
    group_id: &str,
    token: &str,
    api_version: &str,
    text: &str,
    attachment: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("owner_id", format!("-{}", group_id)),
        ("from_group", "1".to_string()),
        ("message", text.to_string()),
    ];
    if let Some(att) = attachment {
        params.push(("attachments", att.to_string()));
    }
    params.push(("v", api_version.to_string()));
    params.push(("access_token", token.to_string()));
    params
}
