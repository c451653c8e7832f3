//! LLM structured generator connector (OpenAI-compatible chat API)
//!
//! The richest connector: one call must yield a multi-entity graph of
//! markets, each carrying nested products, competitors and leads. The
//! response is schema-validated; malformed or partial JSON gets exactly one
//! corrective retry with the parse error echoed back, then surfaces as a
//! job failure.

use super::{with_retry, ConnectorResult, DiscoveryOptions, MarketDiscovery, SeedCompany};
use crate::config::GeneratorConfig;
use crate::errors::ConnectorError;
use crate::job::{DiscoveredCompany, DiscoveredMarket, DiscoveredProduct};
use crate::model::{CompanySize, Segmentation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "generator";

pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// Wire schema the model is instructed to produce, Portuguese keys included
#[derive(Deserialize)]
struct DiscoveryWire {
    mercados: Vec<MarketWire>,
}

#[derive(Deserialize)]
struct MarketWire {
    nome: String,
    categoria: Option<String>,
    segmentacao: Option<Segmentation>,
    #[serde(rename = "tamanhoMercado")]
    tamanho_mercado: Option<String>,
    #[serde(rename = "crescimentoAnual")]
    crescimento_anual: Option<String>,
    #[serde(default)]
    produtos: Vec<ProductWire>,
    #[serde(default)]
    concorrentes: Vec<CompanyWire>,
    #[serde(default)]
    leads: Vec<CompanyWire>,
}

#[derive(Deserialize)]
struct ProductWire {
    nome: String,
    descricao: Option<String>,
}

#[derive(Deserialize)]
struct CompanyWire {
    nome: String,
    cnpj: Option<String>,
    site: Option<String>,
    email: Option<String>,
    telefone: Option<String>,
    cidade: Option<String>,
    uf: Option<String>,
    porte: Option<CompanySize>,
    setor: Option<String>,
    #[serde(default = "default_confidence")]
    confianca: u8,
}

fn default_confidence() -> u8 {
    70
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client with static options");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        }
    }

    fn prompt(seed: &SeedCompany, options: &DiscoveryOptions) -> String {
        let mut context = format!("Empresa: {}", seed.name);
        if let Some(cnpj) = &seed.tax_id {
            context.push_str(&format!("\nCNPJ: {}", cnpj.formatted()));
        }
        if let Some(sector) = &seed.sector {
            context.push_str(&format!("\nSetor: {sector}"));
        }
        if let (Some(city), Some(state)) = (&seed.city, &seed.state) {
            context.push_str(&format!("\nLocalização: {city}/{state}"));
        }

        let exclusions = if options.exclude_names.is_empty() {
            String::new()
        } else {
            format!(
                "\nNÃO inclua como lead nenhuma destas empresas: {}.",
                options.exclude_names.join(", ")
            )
        };

        format!(
            "Você é um especialista em pesquisa de mercado B2B no Brasil.\n\n\
             TAREFA: Identifique os MERCADOS onde a empresa abaixo atua e, para cada mercado, \
             os produtos relevantes, {} concorrentes e {} leads (potenciais clientes).\n\n\
             {context}\n\n\
             Retorne um objeto JSON com:\n\
             - mercados: Array com 1-3 mercados, cada um com:\n\
               - nome: Nome do mercado\n\
               - categoria: Categoria do mercado\n\
               - segmentacao: APENAS \"B2B\", \"B2C\" ou \"B2B2C\"\n\
               - tamanhoMercado: Tamanho estimado no Brasil\n\
               - crescimentoAnual: Taxa de crescimento anual estimada\n\
               - produtos: Array de {{nome, descricao}}\n\
               - concorrentes: Array de {{nome, cnpj, site, cidade, uf, porte, setor, confianca}}\n\
               - leads: Array de {{nome, cnpj, site, email, telefone, cidade, uf, porte, setor, confianca}}\n\
             - porte: APENAS \"MEI\", \"Pequena\", \"Média\" ou \"Grande\"\n\
             - confianca: número de 0 a 100\n\
             Leads e concorrentes devem ser conjuntos disjuntos.{exclusions}\n\n\
             Retorne APENAS JSON válido, sem markdown.",
            options.competitors_per_market, options.leads_per_market
        )
    }

    async fn complete(&self, api_key: &str, user_prompt: String) -> ConnectorResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "Você retorna APENAS JSON válido, sem texto adicional.".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.4,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
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
            429 => {
                return Err(ConnectorError::ServiceUnavailable {
                    service: SERVICE.to_string(),
                    message: "rate limited upstream".to_string(),
                })
            }
            status => {
                return Err(ConnectorError::ServiceUnavailable {
                    service: SERVICE.to_string(),
                    message: format!("HTTP {status}"),
                })
            }
        }

        let body: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ConnectorError::MalformedResponse {
                    service: SERVICE.to_string(),
                    message: e.to_string(),
                })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ConnectorError::MalformedResponse {
                service: SERVICE.to_string(),
                message: "empty completion".to_string(),
            })
    }
}

/// Pull the outermost JSON object out of the completion text; models
/// occasionally wrap output in prose or code fences despite instructions
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end >= start).then(|| &content[start..=end])
}

/// Validate the completion against the discovery schema
fn parse_bundle(content: &str) -> Result<Vec<DiscoveredMarket>, String> {
    let json = extract_json(content).ok_or("no JSON object in completion")?;
    let wire: DiscoveryWire = serde_json::from_str(json).map_err(|e| e.to_string())?;

    if wire.mercados.is_empty() {
        return Err("mercados array is empty".to_string());
    }
    if wire.mercados.iter().any(|m| m.nome.trim().is_empty()) {
        return Err("mercado with empty nome".to_string());
    }

    Ok(wire.mercados.into_iter().map(market_from_wire).collect())
}

fn market_from_wire(wire: MarketWire) -> DiscoveredMarket {
    DiscoveredMarket {
        name: wire.nome,
        category: wire.categoria,
        segmentation: wire.segmentacao,
        estimated_size: wire.tamanho_mercado,
        annual_growth: wire.crescimento_anual,
        products: wire
            .produtos
            .into_iter()
            .map(|p| DiscoveredProduct {
                name: p.nome,
                description: p.descricao,
            })
            .collect(),
        competitors: wire.concorrentes.into_iter().map(company_from_wire).collect(),
        leads: wire.leads.into_iter().map(company_from_wire).collect(),
    }
}

fn company_from_wire(wire: CompanyWire) -> DiscoveredCompany {
    DiscoveredCompany {
        name: wire.nome,
        tax_id: wire.cnpj,
        site: wire.site,
        email: wire.email,
        phone: wire.telefone,
        city: wire.cidade,
        state: wire.uf,
        size: wire.porte,
        sector: wire.setor,
        confidence: wire.confianca.min(100),
    }
}

#[async_trait]
impl MarketDiscovery for OpenAiGenerator {
    async fn discover(
        &self,
        seed: &SeedCompany,
        options: &DiscoveryOptions,
    ) -> ConnectorResult<Vec<DiscoveredMarket>> {
        // missing credentials fail fast, before any network attempt
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ConnectorError::Config {
                message: "generator api key not configured".to_string(),
            })?;

        let prompt = Self::prompt(seed, options);
        let content = with_retry(SERVICE, self.max_retries, || {
            self.complete(&api_key, prompt.clone())
        })
        .await?;

        match parse_bundle(&content) {
            Ok(markets) => Ok(markets),
            Err(parse_err) => {
                tracing::warn!(
                    error = %parse_err,
                    "generator output failed schema validation, issuing corrective retry"
                );

                let corrective = format!(
                    "{prompt}\n\nSua resposta anterior era inválida ({parse_err}). \
                     Corrija e retorne APENAS o objeto JSON no esquema pedido."
                );
                let content = with_retry(SERVICE, self.max_retries, || {
                    self.complete(&api_key, corrective.clone())
                })
                .await?;

                parse_bundle(&content).map_err(|e| ConnectorError::MalformedResponse {
                    service: SERVICE.to_string(),
                    message: e,
                })
            }
        }
    }
}
