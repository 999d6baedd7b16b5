use clap::Parser;

use artisan::builder::source::LocalSourceProvider;
use artisan::builder::{BuildOptions, Builder};
use artisan::cli::{parse_credentials, Args, Command};
use artisan::config::RegistryRoot;
use artisan::error::Result;
use artisan::flow::Flow;
use artisan::name::PackageName;
use artisan::registry::Registry;
use artisan::runner::{ProcessLauncher, RunOptions, Runner};

const DEBUG_ENV_VAR: &str = "ART_DEBUG";

fn initialize_logger(debug: bool) -> Result<()> {
    let filter = if debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let config = simplelog::ConfigBuilder::new().add_filter_allow_str("artisan").build();
    simplelog::TermLogger::init(filter, config, simplelog::TerminalMode::Mixed, simplelog::ColorChoice::Auto)
        .map_err(|e| artisan::error::ArtError::io(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let mut args = Args::parse();
    if std::env::var(DEBUG_ENV_VAR).is_ok() {
        args.debug = true;
    }
    initialize_logger(args.debug)?;

    let root_path = args
        .registry_root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().expect("current directory is accessible"));
    let root = RegistryRoot::open(root_path)?;

    match args.command {
        Command::Build { from, from_path, token, name, profile, copy, interactive, target } => {
            let provider = LocalSourceProvider;
            let builder = Builder::new(&root, &provider);
            let opts = BuildOptions {
                from: &from,
                from_path: from_path.as_deref(),
                token: token.as_deref(),
                name: PackageName::parse(&name)?,
                profile: profile.as_deref(),
                copy,
                interactive,
                target_override: target.as_deref(),
            };
            let seal = builder.build(&opts)?;
            println!("built {} ({})", seal.manifest.ref_, seal.digest);
        }
        Command::Push { name, user } => {
            let pkg_name = PackageName::parse(&name)?;
            let creds = user.as_deref().map(parse_credentials).transpose()?;
            let creds = artisan::remote::Credentials::from_env_or(creds);
            let client = artisan::remote::HttpRemoteClient::new(&pkg_name.domain)?;
            push_package(&client, &root, &pkg_name, creds.as_ref()).await?;
            println!("pushed {}", pkg_name.fully_qualified());
        }
        Command::Pull { name, user } => {
            let pkg_name = PackageName::parse(&name)?;
            let creds = user.as_deref().map(parse_credentials).transpose()?;
            let creds = artisan::remote::Credentials::from_env_or(creds);
            let client = artisan::remote::HttpRemoteClient::new(&pkg_name.domain)?;
            pull_package(&client, &root, &pkg_name, creds.as_ref()).await?;
            println!("pulled {}", pkg_name.fully_qualified());
        }
        Command::Open { name, path } => {
            let registry = Registry::open(root.clone())?;
            let pkg_name = PackageName::parse(&name)?;
            registry.open(&pkg_name, &path, None)?;
            println!("opened {} into {}", pkg_name.fully_qualified(), path.display());
        }
        Command::Tag { src, dst } => {
            let mut registry = Registry::open(root.clone())?;
            registry.tag(&PackageName::parse(&src)?, &PackageName::parse(&dst)?)?;
            println!("tagged {src} as {dst}");
        }
        Command::Ls => {
            let registry = Registry::open(root.clone())?;
            for (repo, package) in registry.list() {
                println!("{repo}\t{}\t{}\t{}", package.short_id(), package.tags.join(","), package.size);
            }
        }
        Command::Rm { names } => {
            let mut registry = Registry::open(root.clone())?;
            let parsed: Vec<PackageName> = names.iter().map(|n| PackageName::parse(n)).collect::<Result<_>>()?;
            registry.remove(&parsed)?;
            println!("removed {} tag(s)", parsed.len());
        }
        Command::Export { names, dst_uri } => {
            let registry = Registry::open(root.clone())?;
            let parsed: Vec<PackageName> = names.iter().map(|n| PackageName::parse(n)).collect::<Result<_>>()?;
            registry.export(&parsed, &dst_uri)?;
            println!("exported {} package(s) to {}", parsed.len(), dst_uri.display());
        }
        Command::Run { name, function, path, detached, clean, ignore_exports, user } => {
            let mut registry = Registry::open(root.clone())?;
            let creds = user.as_deref().map(parse_credentials).transpose()?;
            let launcher = ProcessLauncher;
            let runner = Runner::new(&root, &launcher);
            let opts = RunOptions {
                name: PackageName::parse(&name)?,
                function: &function,
                credentials: creds.as_ref(),
                path,
                ignore_exports,
                clean,
                detached,
            };
            runner.run_function(&mut registry, &opts)?;
        }
        Command::FlowRun { flow_path, runner, build_path, user, interactive } => {
            let mut flow = Flow::load(&flow_path)?;
            let registry = Registry::open(root.clone())?;
            let build_description = match build_path {
                Some(p) => Some(artisan::engine::BuildDescription::load(&p.join("build.yaml"))?),
                None => None,
            };
            let env: std::collections::HashMap<String, String> = std::env::vars().collect();
            flow.merge(build_description.as_ref(), Some(&registry), &env, interactive, &root.tmp_dir())?;
            let creds = user.as_deref().map(parse_credentials).transpose()?;
            let flow_creds = creds.map(artisan::flow::Credentials::from);
            let output = flow.run(&runner, flow_creds.as_ref(), interactive).await?;
            println!("{output}");
        }
    }

    Ok(())
}

async fn push_package(
    client: &artisan::remote::HttpRemoteClient,
    root: &RegistryRoot,
    name: &PackageName,
    creds: Option<&artisan::remote::Credentials>,
) -> Result<()> {
    use artisan::remote::{PackageInfo, RemoteClient};

    let registry = Registry::open(root.clone())?;
    let package = registry.find_by_name(name)?;
    let manifest = registry.manifest(name)?;
    let (zip_path, _) = root.file_ref_paths(&package.file_ref);
    let zip_bytes = std::fs::read(&zip_path)?;

    client.push_blob(&name.group, &name.name, &package.file_ref, zip_bytes, creds).await?;
    client
        .upsert_package_info(
            &name.fully_qualified(),
            &PackageInfo { id: package.id.clone(), tags: package.tags.clone(), size: manifest.size.clone() },
            creds,
        )
        .await
}

async fn pull_package(
    client: &artisan::remote::HttpRemoteClient,
    root: &RegistryRoot,
    name: &PackageName,
    creds: Option<&artisan::remote::Credentials>,
) -> Result<()> {
    use artisan::remote::RemoteClient;
    use artisan::seal::Seal;

    let seal: Seal = client.get_seal(&name.group, &name.name, &name.tag, creds).await?;
    let package_id = seal.package_id()?;

    let mut registry = Registry::open(root.clone())?;
    if let Some(existing) = registry.find_by_id(&package_id).cloned() {
        return registry.attach_tag(name, &existing);
    }

    let reference = seal.manifest.ref_.clone();
    let bytes = client.pull_blob(&name.group, &name.name, &reference, creds).await?;
    seal.validate(&bytes)?;

    let zip_path = root.tmp_dir().join(format!("{reference}.zip"));
    std::fs::write(&zip_path, &bytes)?;

    registry.add(&zip_path, &seal, name)
}
