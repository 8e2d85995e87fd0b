//! Configuração do Conveyor carregada a partir de `conveyor.toml`.
//!
//! A struct [`ConveyorConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `CONVEYOR_TRANSFER_URL` tem precedência sobre o
//! arquivo.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConveyorError;
use crate::retry::RetryPolicy;

/// Configuração de nível superior carregada de `conveyor.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConveyorConfig {
    /// Diretório onde os registros duráveis de jobs são persistidos.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// URL base do gateway de transferência de recursos.
    #[serde(default = "default_transfer_base_url")]
    pub transfer_base_url: String,

    /// Comando de transformação executado na fase de processamento.
    #[serde(default = "default_transform_command")]
    pub transform_command: String,

    /// Argumentos adicionais passados ao comando de transformação.
    #[serde(default)]
    pub transform_args: Vec<String>,

    /// Número máximo de transferências concorrentes dentro de um job.
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,

    /// Prazo (schedule-to-close) de uma única tentativa de atividade, em ms.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Política de retentativas aplicada a cada atividade.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Tabela `[retry]` de `conveyor.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Espera após a primeira tentativa falha, em milissegundos.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Multiplicador de backoff exponencial por tentativa.
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,

    /// Teto de qualquer espera individual, em milissegundos.
    #[serde(default = "default_maximum_interval_ms")]
    pub maximum_interval_ms: u64,

    /// Orçamento total de invocações, contando a primeira tentativa.
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,
}

// Valores padrão espelham a política exigida pelo requisito de durabilidade:
// 1s inicial, coeficiente 2.0, teto 2s, 5 tentativas.
fn default_initial_interval_ms() -> u64 {
    1000
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

fn default_maximum_interval_ms() -> u64 {
    2000
}

fn default_maximum_attempts() -> u32 {
    5
}

fn default_store_dir() -> String {
    ".conveyor/jobs".to_string()
}

fn default_transfer_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_transform_command() -> String {
    "transform".to_string()
}

fn default_max_fanout() -> usize {
    4
}

fn default_attempt_timeout_ms() -> u64 {
    5000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            maximum_interval_ms: default_maximum_interval_ms(),
            maximum_attempts: default_maximum_attempts(),
        }
    }
}

impl RetrySettings {
    /// Converte a tabela em uma [`RetryPolicy`] validada.
    pub fn to_policy(&self) -> Result<RetryPolicy, ConveyorError> {
        let policy = RetryPolicy {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            backoff_coefficient: self.backoff_coefficient,
            maximum_interval: Duration::from_millis(self.maximum_interval_ms),
            maximum_attempts: self.maximum_attempts,
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            transfer_base_url: default_transfer_base_url(),
            transform_command: default_transform_command(),
            transform_args: Vec::new(),
            max_fanout: default_max_fanout(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            retry: RetrySettings::default(),
        }
    }
}

impl ConveyorConfig {
    /// Carrega a configuração de `conveyor.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let path = Path::new("conveyor.toml");
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ConveyorConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(url) = std::env::var("CONVEYOR_TRANSFER_URL")
            && !url.is_empty()
        {
            config.transfer_base_url = url;
        }

        Ok(config)
    }

    /// Prazo de uma tentativa de atividade como [`Duration`].
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ConveyorConfig::default();
        assert_eq!(config.store_dir, ".conveyor/jobs");
        assert_eq!(config.transfer_base_url, "http://localhost:8080");
        assert_eq!(config.max_fanout, 4);
        assert_eq!(config.attempt_timeout_ms, 5000);
        assert_eq!(config.retry.initial_interval_ms, 1000);
        assert_eq!(config.retry.maximum_interval_ms, 2000);
        assert_eq!(config.retry.maximum_attempts, 5);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            transfer_base_url = "http://gateway:9000"
            [retry]
            maximum_attempts = 3
        "#;
        let config: ConveyorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.transfer_base_url, "http://gateway:9000");
        assert_eq!(config.retry.maximum_attempts, 3);
        // Campos omitidos mantêm os defaults.
        assert_eq!(config.retry.initial_interval_ms, 1000);
        assert_eq!(config.store_dir, ".conveyor/jobs");
    }

    #[test]
    fn retry_settings_convert_to_validated_policy() {
        let policy = RetrySettings::default().to_policy().unwrap();
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.maximum_interval, Duration::from_secs(2));
        assert_eq!(policy.maximum_attempts, 5);

        let bad = RetrySettings {
            backoff_coefficient: 0.5,
            ..Default::default()
        };
        assert!(bad.to_policy().is_err());
    }
}
