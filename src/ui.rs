//! Interface de terminal do Conveyor — spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente
//! a execução de um job no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::JobStatus;
use crate::state_machine::{AuditRecord, JobState};

/// Indicador visual de progresso para a execução de um job no terminal.
///
/// Exibe um spinner animado durante o processamento e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e cancelamento
/// (amarelo).
pub struct JobProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    // Estilo verde para mensagens de sucesso.
    green: Style,
    // Estilo vermelho para mensagens de falha.
    red: Style,
    // Estilo amarelo para cancelamentos e retentativas.
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com o identificador do job e retorna a instância de progresso.
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("PENDING: {job_id}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem do spinner para refletir o estado atual.
    pub fn update_state(&self, state: JobState) {
        self.pb.set_message(format!("{state}"));
    }

    /// Exibe uma mensagem de retentativa com o número da tentativa e o motivo.
    #[allow(dead_code)]
    pub fn retry(&self, attempt: u32, max: u32, reason: &str) {
        self.pb.println(format!(
            "  {} Retry {attempt}/{max}: {reason}",
            self.yellow.apply_to("↻")
        ));
    }

    /// Finaliza o spinner e exibe o resultado final do job.
    ///
    /// Sucesso é mostrado em verde com checkmark; falha em vermelho com X;
    /// cancelamento em amarelo.
    pub fn complete(&self, status: &JobStatus) {
        self.pb.finish_and_clear();
        match status.state {
            JobState::Completed => {
                println!("  {} Job completed successfully", self.green.apply_to("✓"));
            }
            JobState::Cancelled => {
                println!("  {} Job cancelled", self.yellow.apply_to("⊘"));
            }
            _ => {
                let reason = status.error.as_deref().unwrap_or("unknown failure");
                println!("  {} Job failed: {reason}", self.red.apply_to("✗"));
            }
        }
    }

    /// Imprime o registro de auditoria formatado em JSON com estilo colorido.
    pub fn print_audit(&self, record: &AuditRecord) {
        let status_style = match record.state {
            JobState::Completed => &self.green,
            JobState::Failed => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", status_style.apply_to("─── Audit Record ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(record).unwrap_or_default()
        );
    }
}
