//! Interface de linha de comando do presswright baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, status,
//! validate-config) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// presswright: pesquisa, redige, revisa e publica conteúdo agendado.
#[derive(Debug, Parser)]
#[command(name = "presswright", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./presswright.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa os itens vencidos de todos os projetos ativos.
    Run {
        /// Restringe a execução a um projeto.
        #[arg(long)]
        project: Option<String>,

        /// Gera e armazena o conteúdo sem publicar.
        #[arg(long, default_value_t = false)]
        generate_only: bool,
    },

    /// Mostra projetos e a contagem de itens por status.
    Status,

    /// Carrega e valida a configuração e os projetos do armazenamento.
    ValidateConfig,
}
