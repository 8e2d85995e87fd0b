//! Interface de linha de comando do Conveyor baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (submit, status,
//! cancel, resume, demo) e flags globais (--max-attempts, --verbose).

use clap::{Parser, Subcommand};

/// Conveyor — Orquestrador durável de jobs de transformação de arquivos.
#[derive(Debug, Parser)]
#[command(name = "conveyor", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Número máximo de tentativas por atividade nesta sessão.
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submete um job definido em um arquivo JSON e acompanha até o fim.
    Submit {
        /// Caminho para o arquivo JSON contendo a definição do job.
        file: String,
    },

    /// Mostra o estado atual de um job.
    Status {
        /// Identificador do job.
        job_id: String,
    },

    /// Solicita o cancelamento de um job em andamento.
    Cancel {
        /// Identificador do job.
        job_id: String,
    },

    /// Retoma todos os jobs em andamento após um reinício do orquestrador.
    Resume,

    /// Executa a demonstração embutida da máquina de estados.
    Demo,
}
