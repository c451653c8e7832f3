//! CNPJ registry connector (ReceitaWS-compatible API)
//!
//! Checksum validation happens locally in the taxid module before this
//! client is ever reached; a call here always carries a syntactically valid
//! CNPJ.

use super::{with_retry, ConnectorResult, RegistrationData, RegistryLookup};
use crate::config::RegistryConfig;
use crate::errors::ConnectorError;
use crate::taxid::Cnpj;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const SERVICE: &str = "registry";

pub struct ReceitaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

/// Wire format of the registry response
#[derive(Deserialize)]
struct ReceitaResponse {
    status: Option<String>,
    message: Option<String>,
    nome: Option<String>,
    fantasia: Option<String>,
    email: Option<String>,
    telefone: Option<String>,
    municipio: Option<String>,
    uf: Option<String>,
    #[serde(default)]
    atividade_principal: Vec<ReceitaActivity>,
}

#[derive(Deserialize)]
struct ReceitaActivity {
    text: Option<String>,
}

impl ReceitaClient {
    pub fn new(config: &RegistryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client with static options");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: 2,
        }
    }

    async fn fetch(&self, cnpj: &Cnpj) -> ConnectorResult<RegistrationData> {
        let url = format!("{}/cnpj/{}", self.base_url, cnpj.digits());

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConnectorError::from_reqwest(SERVICE, e))?;

        match response.status().as_u16() {
            200 => {}
            401 | 403 => {
                return Err(ConnectorError::Unauthorized {
                    service: SERVICE.to_string(),
                })
            }
            404 => {
                return Err(ConnectorError::NotFound {
                    query: cnpj.digits().to_string(),
                })
            }
            status => {
                return Err(ConnectorError::ServiceUnavailable {
                    service: SERVICE.to_string(),
                    message: format!("HTTP {status}"),
                })
            }
        }

        let body: ReceitaResponse =
            response
                .json()
                .await
                .map_err(|e| ConnectorError::MalformedResponse {
                    service: SERVICE.to_string(),
                    message: e.to_string(),
                })?;

        // the public API reports unknown CNPJs as status ERROR with HTTP 200
        if body.status.as_deref() == Some("ERROR") {
            return Err(ConnectorError::NotFound {
                query: body
                    .message
                    .unwrap_or_else(|| cnpj.digits().to_string()),
            });
        }

        let legal_name = body.nome.filter(|n| !n.trim().is_empty()).ok_or_else(|| {
            ConnectorError::MalformedResponse {
                service: SERVICE.to_string(),
                message: "missing razão social".to_string(),
            }
        })?;

        Ok(RegistrationData {
            cnpj: cnpj.clone(),
            legal_name,
            trade_name: body.fantasia.filter(|s| !s.trim().is_empty()),
            email: body.email.filter(|s| !s.trim().is_empty()),
            phone: body.telefone.filter(|s| !s.trim().is_empty()),
            city: body.municipio.filter(|s| !s.trim().is_empty()),
            state: body.uf.filter(|s| !s.trim().is_empty()),
            activity: body
                .atividade_principal
                .into_iter()
                .find_map(|a| a.text)
                .filter(|s| !s.trim().is_empty()),
        })
    }
}

#[async_trait]
impl RegistryLookup for ReceitaClient {
    async fn lookup(&self, cnpj: &Cnpj) -> ConnectorResult<RegistrationData> {
        with_retry(SERVICE, self.max_retries, || self.fetch(cnpj)).await
    }
}
