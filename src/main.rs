use clap::Parser;
use fieldseal::cli::commands;
use fieldseal::cli::{BackupAction, Cli, Commands, RecordAction};

fn main() {
    let cli = Cli::parse();
    fieldseal::cli::init_logging();

    let result = match cli.command {
        Commands::EncryptField {
            ref field,
            ref record_id,
            ref value,
            json,
        } => commands::field::execute_encrypt(&cli, field, record_id, value.as_deref(), json),
        Commands::DecryptField {
            ref field,
            ref record_id,
            ref envelope,
        } => commands::field::execute_decrypt(&cli, field, record_id, envelope.as_deref()),
        Commands::Record { ref action } => match action {
            RecordAction::Encrypt { table, file } => {
                commands::record::execute_encrypt(&cli, table, file.as_deref())
            }
            RecordAction::Decrypt { table, file } => {
                commands::record::execute_decrypt(&cli, table, file.as_deref())
            }
        },
        Commands::Backup { ref action } => match action {
            BackupAction::Create {
                table,
                input,
                output,
            } => commands::backup::execute_create(&cli, table, input, output),
            BackupAction::Restore {
                table,
                file,
                output,
            } => commands::backup::execute_restore(&cli, table, file, output.as_deref()),
        },
        Commands::HashPassword { iterations } => commands::password::execute_hash(&cli, iterations),
        Commands::VerifyPassword {
            ref hash,
            ref salt,
            iterations,
        } => commands::password::execute_verify(&cli, hash, salt, iterations),
        Commands::GenId { ref prefix } => commands::generate::execute_id(prefix.as_deref()),
        Commands::GenKey => commands::generate::execute_key(),
        Commands::Keys => commands::keys::execute(&cli),
        Commands::Audit { last, ref since } => {
            commands::audit_cmd::execute(&cli, last, since.as_deref())
        }
    };

    if let Err(e) = result {
        fieldseal::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
