//! Tipos de erro para o cliente da API Anthropic.
//!
//! Define [`AnthropicError`] com variantes para rate limiting, erros da API,
//! erros de rede e respostas ilegíveis. Cada variante é mapeada para um
//! [`ErrorKind`] pelo método [`AnthropicError::kind`], sem inspecionar texto.

use thiserror::Error;

use crate::error::ErrorKind;

/// Erros que podem ocorrer ao interagir com a API da Anthropic.
///
/// - [`RateLimited`](AnthropicError::RateLimited): o servidor retornou HTTP 429
/// - [`ApiError`](AnthropicError::ApiError): qualquer outro erro HTTP (4xx/5xx)
/// - [`NetworkError`](AnthropicError::NetworkError): falha na camada de rede
/// - [`EmptyResponse`](AnthropicError::EmptyResponse): resposta sem bloco de texto
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// O servidor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A resposta não continha nenhum bloco de texto.
    #[error("response contained no text block")]
    EmptyResponse,
}

impl AnthropicError {
    /// Classifica o erro para a política de retentativa.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnthropicError::RateLimited { .. } => ErrorKind::Transient,
            AnthropicError::ApiError { status, .. } => ErrorKind::from_status(*status),
            AnthropicError::NetworkError(e) => e
                .status()
                .map(|s| ErrorKind::from_status(s.as_u16()))
                .unwrap_or(ErrorKind::Transient),
            AnthropicError::EmptyResponse => ErrorKind::Transient,
        }
    }
}
