//! Print a role's configuration script without touching any provider.

use crate::cli::RenderArgs;
use anyhow::{Context as _, Result, bail};
use nodekit::script::{Backend, DEFAULT_DB_ROOT_PASSWORD, render};
use nodekit::{RenderContext, Role};

pub fn run(args: &RenderArgs) -> Result<()> {
    let context = build_context(args)?;
    let script = render(args.role, &context)?;
    print!("{}", script.render());
    Ok(())
}

fn build_context(args: &RenderArgs) -> Result<RenderContext> {
    match args.role {
        Role::Database => Ok(RenderContext::Database {
            private_address: args
                .private
                .clone()
                .context("--private is required to render the db script")?,
            root_password: args
                .db_password
                .clone()
                .unwrap_or_else(|| DEFAULT_DB_ROOT_PASSWORD.to_string()),
        }),
        Role::WebServer1 | Role::WebServer2 => Ok(RenderContext::WebServer {
            public_address: args.public.clone().with_context(|| {
                format!("--public is required to render the {} script", args.role)
            })?,
        }),
        Role::LoadBalancer => {
            if args.backends.is_empty() {
                bail!("at least one --backend NAME=ADDRESS is required to render the lb script");
            }
            let backends = args
                .backends
                .iter()
                .map(String::as_str)
                .map(parse_backend)
                .collect::<Result<Vec<_>>>()?;
            Ok(RenderContext::LoadBalancer { backends })
        }
    }
}

fn parse_backend(spec: &str) -> Result<Backend> {
    match spec.split_once('=') {
        Some((name, address)) if !name.trim().is_empty() && !address.trim().is_empty() => {
            Ok(Backend::new(name.trim(), address.trim()))
        }
        _ => bail!("invalid backend '{spec}', expected NAME=ADDRESS"),
    }
}
