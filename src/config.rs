//! Configuração do Presswright carregada a partir de `presswright.toml`.
//!
//! A struct [`PresswrightConfig`] contém os parâmetros globais; cada projeto
//! traz seu próprio [`ProjectConfig`], com a plataforma de publicação descrita
//! por uma variante tipada de [`PlatformConfig`] e validada uma única vez,
//! antes de qualquer chamada externa.
//! As variáveis de ambiente `ANTHROPIC_API_KEY` e `PRESSWRIGHT_MODEL` têm
//! precedência sobre o arquivo.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::anthropic::DEFAULT_MODEL;
use crate::content::{MAX_SCORE, MIN_SCORE, StyleConfig};
use crate::error::PressError;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "presswright.toml";

/// Configuração de nível superior carregada de `presswright.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresswrightConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    /// Modelo usado para geração, avaliação e pesquisa.
    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint compatível com SearXNG para a pesquisa.
    #[serde(default)]
    pub search_url: Option<String>,

    /// Timeout padrão, em segundos, de cada colaborador externo.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout, em segundos, de cada chamada ao modelo. Gerar um artigo
    /// longo leva bem mais que uma busca.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Gera e persiste o conteúdo sem publicar.
    #[serde(default)]
    pub generate_only: bool,

    /// Arquivo JSON usado pelo armazenamento da CLI.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub quality: QualitySettings,

    #[serde(default)]
    pub research: ResearchSettings,

    /// Só tem efeito quando a biblioteca recebe um `ImageSource` via
    /// `PublishingOrchestrator::with_media`; a CLI não tem fonte de imagens.
    #[serde(default)]
    pub media: MediaSettings,
}

// Valor padrão do modelo.
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

// Valor padrão do timeout: 30 segundos.
fn default_timeout_secs() -> u64 {
    30
}

// Valor padrão do timeout do modelo: 3 minutos.
fn default_llm_timeout_secs() -> u64 {
    180
}

// Valor padrão do armazenamento: presswright.json no diretório atual.
fn default_store_path() -> PathBuf {
    PathBuf::from("presswright.json")
}

fn default_true() -> bool {
    true
}

impl Default for PresswrightConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            search_url: None,
            timeout_secs: default_timeout_secs(),
            llm_timeout_secs: default_llm_timeout_secs(),
            generate_only: false,
            store_path: default_store_path(),
            retry: RetryPolicy::default(),
            quality: QualitySettings::default(),
            research: ResearchSettings::default(),
            media: MediaSettings::default(),
        }
    }
}

impl PresswrightConfig {
    /// Carrega a configuração de `path`, ou de `presswright.toml` no diretório atual.
    /// Usa valores padrão se o arquivo padrão não existir; um caminho explícito
    /// inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }
        if let Ok(model) = std::env::var("PRESSWRIGHT_MODEL")
            && !model.is_empty()
        {
            config.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<PresswrightConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PressError> {
        self.quality.validate()?;
        if self.timeout_secs == 0 {
            return Err(PressError::Config("timeout_secs must be positive".into()));
        }
        if self.llm_timeout_secs == 0 {
            return Err(PressError::Config("llm_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

/// Critério de aceitação e orçamento do ciclo de refinamento.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Nota mínima (1–10) para aceitar um rascunho.
    pub target_score: f32,
    /// Rodadas normais de melhoria, contando o rascunho inicial.
    pub max_iterations: u32,
    /// Teto absoluto, nunca ultrapassado por nenhuma decisão agêntica.
    pub safety_cap: u32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            target_score: 8.0,
            max_iterations: 4,
            safety_cap: 6,
        }
    }
}

impl QualitySettings {
    /// Número máximo de iterações efetivamente permitido.
    pub fn iteration_limit(&self) -> u32 {
        self.max_iterations.min(self.safety_cap).max(1)
    }

    pub fn validate(&self) -> Result<(), PressError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&self.target_score) {
            return Err(PressError::Config(format!(
                "target_score {} outside {MIN_SCORE}..={MAX_SCORE}",
                self.target_score
            )));
        }
        if self.max_iterations == 0 {
            return Err(PressError::Config("max_iterations must be at least 1".into()));
        }
        if self.safety_cap < self.max_iterations {
            return Err(PressError::Config(format!(
                "safety_cap {} is below max_iterations {}",
                self.safety_cap, self.max_iterations
            )));
        }
        Ok(())
    }
}

/// Parâmetros do orquestrador de pesquisa.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    pub results_per_query: usize,
    pub max_queries: usize,
    /// Abaixo desta confiança (0–100) os melhores resultados são enriquecidos.
    pub confidence_threshold: u8,
    pub enrich_count: usize,
    /// Orçamento aproximado de tokens por página resumida.
    pub token_budget: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            results_per_query: 5,
            max_queries: 4,
            confidence_threshold: 60,
            enrich_count: 3,
            token_budget: 1500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub enabled: bool,
    pub images_per_item: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            images_per_item: 1,
        }
    }
}

/// Configuração por projeto (tenant). Somente leitura durante uma execução.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub style: StyleConfig,
    /// Substitui as configurações globais de qualidade para este projeto.
    #[serde(default)]
    pub quality: Option<QualitySettings>,
    #[serde(default = "default_true")]
    pub media_enabled: bool,
}

impl ProjectConfig {
    pub fn new(id: impl Into<String>, platform: PlatformConfig) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            active: true,
            platform,
            style: StyleConfig::default(),
            quality: None,
            media_enabled: true,
        }
    }

    pub fn platform_id(&self) -> &str {
        self.platform.platform_id()
    }

    /// Verifica a forma declarada da configuração; erros aqui são fatais.
    pub fn validate(&self) -> Result<(), PressError> {
        if self.id.trim().is_empty() {
            return Err(PressError::Config("project id must not be empty".into()));
        }
        if self.style.target_words == 0 {
            return Err(PressError::Config(format!(
                "project '{}': style.target_words must be positive",
                self.id
            )));
        }
        if let Some(quality) = &self.quality {
            quality.validate()?;
        }
        self.platform
            .validate()
            .map_err(|reason| PressError::Config(format!("project '{}': {reason}", self.id)))
    }
}

/// Plataforma de destino, uma variante por tipo de plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformConfig {
    Webhook(WebhookConfig),
    Filesystem(FilesystemConfig),
    /// Plugin registrado externamente, identificado por `platform`.
    Custom(CustomPlatformConfig),
}

pub const WEBHOOK_PLATFORM: &str = "webhook";
pub const FILESYSTEM_PLATFORM: &str = "filesystem";

impl PlatformConfig {
    pub fn platform_id(&self) -> &str {
        match self {
            PlatformConfig::Webhook(_) => WEBHOOK_PLATFORM,
            PlatformConfig::Filesystem(_) => FILESYSTEM_PLATFORM,
            PlatformConfig::Custom(custom) => &custom.platform,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            PlatformConfig::Webhook(webhook) => {
                check_http_url("webhook url", &webhook.url)?;
                if let Some(verify_url) = &webhook.verify_url {
                    check_http_url("webhook verify_url", verify_url)?;
                }
                if webhook.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
                    return Err("webhook token is present but empty".into());
                }
                Ok(())
            }
            PlatformConfig::Filesystem(fs) => {
                if fs.directory.as_os_str().is_empty() {
                    Err("filesystem directory must not be empty".into())
                } else {
                    Ok(())
                }
            }
            PlatformConfig::Custom(custom) => {
                if custom.platform.trim().is_empty() {
                    Err("custom platform id must not be empty".into())
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn check_http_url(field: &str, url: &str) -> Result<(), String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("{field} must be an http(s) URL, got '{url}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Enviado como `Authorization: Bearer <token>`.
    #[serde(default)]
    pub token: Option<String>,
    /// Endpoint consultado por `authenticate()` para validar a credencial.
    #[serde(default)]
    pub verify_url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPlatformConfig {
    pub platform: String,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}
