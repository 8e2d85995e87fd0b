//! Tipos de dados para requisições ao gateway de transferência de recursos.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o formato esperado pelos endpoints `/v1/download` e `/v1/upload`
//! do gateway.

use serde::{Deserialize, Serialize};

/// Corpo da requisição para o endpoint `/v1/download` do gateway.
///
/// Pede o download de um único recurso identificado por `key`, autorizado
/// pelo `token` do job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Token de autorização do job.
    pub token: String,
    /// Chave (ou URL) do recurso a baixar.
    pub key: String,
}

/// Corpo da requisição para o endpoint `/v1/upload` do gateway.
///
/// Pede o envio do artefato `local_key` produzido pela transformação para
/// o destino `remote_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Token de autorização do job.
    pub token: String,
    /// Chave local do artefato produzido.
    pub local_key: String,
    /// Destino remoto do envio.
    pub remote_url: String,
}
