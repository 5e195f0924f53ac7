use anyhow::{anyhow, Context, Result};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Environment variable holding a Bedrock API key
pub const BEDROCK_API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

/// SigV4 signing name shared by bedrock-runtime and bedrock-agent-runtime
const SIGNING_NAME: &str = "bedrock";

/// How Bedrock requests are authenticated
#[derive(Clone)]
pub enum BedrockAuth {
    /// IAM credentials, SigV4-signed per request
    SigV4 {
        credentials: Credentials,
        region: String,
    },
    /// Bedrock API key sent as `Authorization: Bearer`
    ApiKey(String),
}

impl BedrockAuth {
    pub fn sigv4(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        region: impl Into<String>,
    ) -> Self {
        BedrockAuth::SigV4 {
            credentials: Credentials::new(
                access_key_id,
                secret_access_key,
                session_token,
                None,
                "cmmc-config",
            ),
            region: region.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BedrockAuth::SigV4 { .. } => "sigv4",
            BedrockAuth::ApiKey(_) => "api-key",
        }
    }
}

impl fmt::Debug for BedrockAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BedrockAuth::SigV4 { region, .. } => f
                .debug_struct("SigV4")
                .field("region", region)
                .finish_non_exhaustive(),
            BedrockAuth::ApiKey(_) => f.write_str("ApiKey(** redacted **)"),
        }
    }
}

/// HTTP transport shared by the Bedrock runtime and agent-runtime providers
pub(crate) struct BedrockHttpClient {
    client: Client,
    auth: BedrockAuth,
    max_retries: u32,
}

impl BedrockHttpClient {
    pub(crate) fn new(auth: BedrockAuth, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        match &auth {
            BedrockAuth::ApiKey(key) if key.is_empty() => {
                return Err(anyhow!(
                    "Bedrock API key is required. Set {} environment variable.",
                    BEDROCK_API_KEY_ENV
                ));
            }
            BedrockAuth::SigV4 { region, .. } if region.is_empty() => {
                return Err(anyhow!("AWS region is required for SigV4 signing"));
            }
            _ => {}
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            auth,
            max_retries,
        })
    }

    pub(crate) fn auth_kind(&self) -> &'static str {
        self.auth.kind()
    }

    /// POST a JSON body, retrying transport failures when configured
    pub(crate) async fn post_json<B, R>(&self, service: &str, url: Url, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .with_context(|| format!("Failed to serialize {} request", service))?;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.try_post(service, url.clone(), &payload).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tracing::warn!(
                            "{} request failed (attempt {}/{}), retrying...",
                            service,
                            attempt + 1,
                            self.max_retries + 1
                        );
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed")))
    }

    async fn try_post<R>(&self, service: &str, url: Url, payload: &[u8]) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(url.clone())
            .header("content-type", "application/json")
            .header("accept", "application/json");

        request = match &self.auth {
            BedrockAuth::ApiKey(key) => request.bearer_auth(key),
            BedrockAuth::SigV4 {
                credentials,
                region,
            } => {
                // Signed at send time so retries carry a fresh timestamp
                let headers = sigv4_headers(credentials, region, &url, payload, SystemTime::now())?;
                headers
                    .into_iter()
                    .fold(request, |req, (name, value)| req.header(name, value))
            }
        };

        let response = request
            .body(payload.to_vec())
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", service))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(anyhow!("{} error ({}): {}", service, status, error_text));
        }

        let response_text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response body", service))?;

        tracing::debug!(service, response = %response_text, "Raw Bedrock response");

        serde_json::from_str::<R>(&response_text)
            .with_context(|| format!("Failed to parse {} response", service))
    }
}

/// SigV4 headers (`authorization`, `x-amz-date`, optional security token) for a JSON POST
fn sigv4_headers(
    credentials: &Credentials,
    region: &str,
    url: &Url,
    payload: &[u8],
    time: SystemTime,
) -> Result<Vec<(String, String)>> {
    let identity = credentials.clone().into();
    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SIGNING_NAME)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .context("Failed to build SigV4 signing parameters")?
        .into();

    let signed_headers = [
        ("content-type", "application/json"),
        ("accept", "application/json"),
    ];
    let signable = SignableRequest::new(
        "POST",
        url.as_str(),
        signed_headers.into_iter(),
        SignableBody::Bytes(payload),
    )
    .context("Failed to prepare request for signing")?;

    let (instructions, _signature) = sign(signable, &params)
        .context("Failed to sign Bedrock request")?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}

/// Append path segments to an endpoint, percent-encoding each one
pub(crate) fn endpoint_url(endpoint: &str, segments: &[&str]) -> Result<Url> {
    let mut url =
        Url::parse(endpoint).with_context(|| format!("Invalid Bedrock endpoint: {}", endpoint))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Bedrock endpoint cannot be a base URL: {}", endpoint))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        assert!(BedrockHttpClient::new(BedrockAuth::ApiKey(String::new()), 30, 0).is_err());
        assert!(BedrockHttpClient::new(BedrockAuth::ApiKey("key".into()), 30, 0).is_ok());
    }

    #[test]
    fn test_client_accepts_iam_credentials() {
        let auth = BedrockAuth::sigv4("AKIDEXAMPLE", "secret", None, "us-east-1");
        let client = BedrockHttpClient::new(auth, 30, 0).unwrap();
        assert_eq!(client.auth_kind(), "sigv4");

        let no_region = BedrockAuth::sigv4("AKIDEXAMPLE", "secret", None, "");
        assert!(BedrockHttpClient::new(no_region, 30, 0).is_err());
    }

    #[test]
    fn test_sigv4_headers_scope_bedrock_service() {
        let credentials = Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            Some("session-token".to_string()),
            None,
            "test",
        );
        let url = endpoint_url(
            "https://bedrock-agent-runtime.us-east-1.amazonaws.com",
            &["knowledgebases", "KB123", "retrieve"],
        )
        .unwrap();

        let headers = sigv4_headers(
            &credentials,
            "us-east-1",
            &url,
            br#"{"retrievalQuery":{"text":"mfa"}}"#,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        )
        .unwrap();

        let header = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };

        let authorization = header("authorization").unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20231114/us-east-1/bedrock/aws4_request"));
        assert!(authorization.contains("SignedHeaders="));
        assert_eq!(header("x-amz-date"), Some("20231114T221320Z"));
        assert_eq!(header("x-amz-security-token"), Some("session-token"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", BedrockAuth::ApiKey("super-secret".into()));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_endpoint_url_encodes_model_arn() {
        let url = endpoint_url(
            "https://bedrock-runtime.us-east-1.amazonaws.com/",
            &[
                "model",
                "arn:aws:bedrock:us-east-1:123456789012:inference-profile/us.anthropic.claude",
                "converse",
            ],
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/arn:aws:bedrock:us-east-1:123456789012:inference-profile%2Fus.anthropic.claude/converse"
        );
    }
}
