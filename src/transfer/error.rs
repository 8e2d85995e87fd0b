//! Tipos de erro para o cliente do gateway de transferência.
//!
//! Define [`TransferError`] com variantes para rate limiting, erros do
//! gateway e erros de rede. Usa `thiserror` para derivar `Display` e `Error`
//! automaticamente a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com o gateway de transferência.
///
/// As variantes cobrem os três cenários mais comuns de falha:
/// - [`RateLimited`](TransferError::RateLimited) — o servidor retornou HTTP 429
/// - [`Api`](TransferError::Api) — qualquer outro erro HTTP (4xx/5xx)
/// - [`Network`](TransferError::Network) — falha na camada de rede
#[derive(Debug, Error)]
pub enum TransferError {
    /// O servidor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pelo gateway (ex.: 401 token inválido, 500 erro interno).
    /// Contém o código de status HTTP e a mensagem de erro do corpo da resposta.
    #[error("transfer API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    /// Encapsula o erro original do `reqwest` via `#[from]`.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
