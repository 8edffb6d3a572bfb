use crate::Commands;
use anyhow::{Context, Result};
use log::info;
use userstore_core::{User, UserRepository, UserService, UserSpec};

/// Executes one command and prints affected users as JSON lines.
pub(crate) fn run<R: UserRepository>(service: &UserService<R>, command: Commands) -> Result<()> {
    match command {
        Commands::Add { id, name, email } => {
            let user = service.register(id, name, email)?;
            print_user(&user)?;
        }
        Commands::Get { id } => print_user(&service.profile(id)?)?,
        Commands::Find { id } => {
            if let Some(user) = service.repository().find(id) {
                print_user(&user)?;
            }
        }
        Commands::ByName { name } => print_user(&service.lookup_by_name(&name)?)?,
        Commands::List {
            name_contains,
            email_domain,
        } => {
            let spec = list_spec(name_contains, email_domain);
            for user in service.search(&spec) {
                print_user(&user)?;
            }
        }
        Commands::Rename { id, name } => print_user(&service.rename(id, name)?)?,
        Commands::Remove { id } => {
            let existed = service.deregister(id);
            info!("event=cli_remove module=cli status=ok id={id} existed={existed}");
        }
        Commands::Clear => service.repository().remove_all(),
    }
    Ok(())
}

fn list_spec(name_contains: Option<String>, email_domain: Option<String>) -> UserSpec {
    let mut parts = Vec::new();
    if let Some(fragment) = name_contains {
        parts.push(UserSpec::name_contains(fragment));
    }
    if let Some(domain) = email_domain {
        parts.push(UserSpec::email_domain(domain));
    }
    match parts.len() {
        0 => UserSpec::All,
        1 => parts.remove(0),
        _ => UserSpec::And(parts),
    }
}

fn print_user(user: &User) -> Result<()> {
    let line = serde_json::to_string(user).context("failed to encode user as JSON")?;
    println!("{line}");
    Ok(())
}
