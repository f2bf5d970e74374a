//! Command-line surface: argument parsing and orchestration wiring C1-C9 together.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::Catalog;
use crate::engine;
use crate::error::MusselsError;
use crate::model::{Nvc, RecipeKind, Variant};
use crate::planner::{self, Plan};
use crate::platform;
use crate::registry::{Git2Fetcher, Registry, LOCAL_COOKBOOK};
use crate::selector;
use crate::tools;
use crate::version::ItemRef;
use crate::workspace::Workspace;

#[derive(Parser, Debug)]
#[command(name = "mussels", version, about = "Build native dependencies from recipe cookbooks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Override the data directory (else MUSSELS_DATA_DIR, else platform default)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Raise logging verbosity for this invocation (-V, -VV, ...)
    #[arg(short = 'V', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage cookbook sources
    Cookbook {
        #[command(subcommand)]
        action: CookbookAction,
    },
    /// Work with individual recipes
    Recipe {
        #[command(subcommand)]
        action: RecipeAction,
    },
    /// Work with required build tools
    Tool {
        #[command(subcommand)]
        action: ToolAction,
    },
    /// Remove cached, installed, or logged state
    Clean {
        #[command(subcommand)]
        action: CleanAction,
    },
    /// Alias for `recipe build`
    Build(ItemArgs),
    /// Alias for `recipe list`
    List(ListArgs),
    /// Alias for `recipe show`
    Show(ItemArgs),
    /// Alias for `cookbook update`
    Update,
}

#[derive(Subcommand, Debug)]
pub enum CookbookAction {
    List,
    Show { name: String },
    Update,
    Trust { name: String },
    Add {
        name: String,
        url: String,
        #[arg(long)]
        author: Option<String>,
    },
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
pub enum RecipeAction {
    List(ListArgs),
    Show(ItemArgs),
    /// Copy a recipe definition (and its patches, if any) into ./local for editing
    Clone(CloneArgs),
    Build(ItemArgs),
}

#[derive(Subcommand, Debug)]
pub enum ToolAction {
    List(ListArgs),
    Show(ItemArgs),
    /// Copy a tool definition into ./local for editing
    Clone(CloneArgs),
    Check(ItemArgs),
}

#[derive(Subcommand, Debug)]
pub enum CleanAction {
    Cache,
    Install,
    Logs,
    All,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ListArgs {
    /// Include entries from untrusted cookbooks and other platforms
    #[arg(short, long)]
    pub all: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CloneArgs {
    /// [cookbook:]name
    pub name: String,

    /// Prefer this cookbook when more than one provides a match
    #[arg(short, long)]
    pub cookbook: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ItemArgs {
    /// [cookbook:]name, e.g. `zlib` or `scrapbook:zlib`
    pub name: String,

    /// Pin to an exact version, equivalent to appending `==VERSION` to `name`
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Prefer this cookbook when more than one provides a match
    #[arg(short, long)]
    pub cookbook: Option<String>,

    /// Target to build for
    #[arg(short, long, default_value = "host")]
    pub target: String,

    /// Show the resolved build plan without running anything
    #[arg(short, long)]
    pub dry_run: bool,

    /// Force a rebuild even if cached artifacts already exist
    #[arg(long)]
    pub clean: bool,

    /// Include untrusted and cross-platform cookbook entries while resolving
    #[arg(short, long)]
    pub all: bool,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace = Workspace::resolve(cli.data_dir.clone());
    let registry = Registry::load(workspace.registry_path(), &workspace.cookbooks_dir())
        .context("loading cookbook registry")?;

    match cli.command {
        Command::Cookbook { action } => dispatch_cookbook(action, &workspace, registry),
        Command::Recipe { action } => dispatch_recipe(action, &workspace, &registry),
        Command::Tool { action } => dispatch_tool(action, &workspace, &registry),
        Command::Clean { action } => dispatch_clean(action, &workspace),
        Command::Build(args) => build_recipe_tree(&args, &workspace, &registry),
        Command::List(args) => list_recipes(&args, &workspace, &registry),
        Command::Show(args) => show_recipe(&args, &workspace, &registry),
        Command::Update => update_cookbooks(&workspace, registry),
    }
}

/// Loads every cookbook into one catalog: `local` (the current working directory's
/// `local/` subdirectory, always trusted) plus every registry entry that is trusted,
/// or every entry regardless of trust when `include_untrusted` is set.
fn load_catalog(registry: &Registry, include_untrusted: bool) -> anyhow::Result<Catalog> {
    let mut catalog = Catalog::new();
    let cwd = std::env::current_dir().context("resolving current directory")?;
    catalog.load_cookbook(&cwd.join("local"), LOCAL_COOKBOOK);

    for (name, entry) in &registry.entries {
        if include_untrusted || registry.is_trusted(name) {
            catalog.load_cookbook(&entry.path, name);
        }
    }
    Ok(catalog)
}

fn item_ref_for(name: &str, version: Option<&str>) -> anyhow::Result<ItemRef> {
    let reference = match version {
        Some(v) => format!("{name}=={v}"),
        None => name.to_string(),
    };
    ItemRef::parse(&reference).map_err(|e| anyhow!(e))
}

fn dispatch_cookbook(action: CookbookAction, workspace: &Workspace, mut registry: Registry) -> anyhow::Result<()> {
    match action {
        CookbookAction::List => {
            for (name, entry) in &registry.entries {
                let trust = if registry.is_trusted(name) {
                    style("trusted").green()
                } else {
                    style("untrusted").yellow()
                };
                println!("{name} [{trust}] - {} recipes, {} tools", entry.recipes, entry.tools);
            }
            Ok(())
        }
        CookbookAction::Show { name } => {
            let entry = registry.entries.get(&name).ok_or_else(|| anyhow!("unknown cookbook '{name}'"))?;
            println!("{name}");
            println!("  url: {}", entry.url.as_deref().unwrap_or("-"));
            println!("  path: {}", entry.path.display());
            println!("  trusted: {}", registry.is_trusted(&name));
            println!("  recipes: {}, tools: {}", entry.recipes, entry.tools);
            Ok(())
        }
        CookbookAction::Update => update_cookbooks(workspace, registry),
        CookbookAction::Trust { name } => {
            registry.trust(&name)?;
            println!("{} {name} is now trusted", style("✓").green());
            Ok(())
        }
        CookbookAction::Add { name, url, author } => {
            let path = workspace.cookbook_dir(&name);
            registry.add(&name, &url, path, author, false)?;
            println!("added cookbook '{name}' (untrusted; run `mussels cookbook trust {name}` before building from it)");
            Ok(())
        }
        CookbookAction::Remove { name } => {
            registry.remove(&name)?;
            println!("removed cookbook '{name}'");
            Ok(())
        }
    }
}

fn update_cookbooks(workspace: &Workspace, mut registry: Registry) -> anyhow::Result<()> {
    let _ = workspace;
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    bar.set_message("updating cookbooks...");
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    registry.update(&Git2Fetcher)?;
    bar.finish_with_message("cookbooks updated");
    Ok(())
}

fn dispatch_recipe(action: RecipeAction, workspace: &Workspace, registry: &Registry) -> anyhow::Result<()> {
    match action {
        RecipeAction::List(args) => list_recipes(&args, workspace, registry),
        RecipeAction::Show(args) => show_recipe(&args, workspace, registry),
        RecipeAction::Clone(args) => clone_recipe(&args, registry),
        RecipeAction::Build(args) => build_recipe_tree(&args, workspace, registry),
    }
}

fn list_recipes(args: &ListArgs, _workspace: &Workspace, registry: &Registry) -> anyhow::Result<()> {
    let catalog = load_catalog(registry, args.all)?;
    let mut nvcs: Vec<&Nvc> = catalog.recipes.keys().collect();
    nvcs.sort();
    for nvc in nvcs {
        println!("{nvc}");
    }
    Ok(())
}

fn show_recipe(args: &ItemArgs, _workspace: &Workspace, registry: &Registry) -> anyhow::Result<()> {
    let catalog = load_catalog(registry, args.all)?;
    let mut index = catalog.sorted_recipes();
    let item_ref = item_ref_for(&args.name, args.version.as_deref())?;
    let nvc = selector::select(&item_ref, &mut index, args.cookbook.as_deref(), Some(&args.target))?;
    let recipe = catalog
        .recipes
        .get(&nvc)
        .ok_or_else(|| anyhow!("'{nvc}' disappeared from the catalog"))?;

    println!("{nvc}");
    println!("  kind: {:?}", recipe.kind);
    println!("  source: {}", recipe.source_url.as_deref().unwrap_or("-"));
    for (host, targets) in &recipe.platforms {
        for (target, variant) in targets {
            println!(
                "  {host}/{target}: dependencies={:?} required_tools={:?}",
                variant.dependencies, variant.required_tools
            );
        }
    }
    Ok(())
}

fn clone_recipe(args: &CloneArgs, registry: &Registry) -> anyhow::Result<()> {
    let catalog = load_catalog(registry, true)?;
    let mut index = catalog.sorted_recipes();
    let item_ref = item_ref_for(&args.name, None)?;
    let nvc = selector::select(&item_ref, &mut index, args.cookbook.as_deref(), None)?;
    let recipe = catalog
        .recipes
        .get(&nvc)
        .ok_or_else(|| anyhow!("'{nvc}' disappeared from the catalog"))?;

    let local_dir = std::env::current_dir()?.join("local");
    std::fs::create_dir_all(&local_dir)?;
    let file_name = recipe
        .origin_file
        .file_name()
        .ok_or_else(|| anyhow!("recipe has no origin file name"))?;
    std::fs::copy(&recipe.origin_file, local_dir.join(file_name))?;

    if let Some(parent) = recipe.origin_file.parent() {
        for variant in recipe.platforms.values().flat_map(|targets| targets.values()) {
            if let Some(subdir) = &variant.patches_subdir {
                let src = parent.join(subdir);
                if src.is_dir() {
                    engine::copy_recursive(&src, &local_dir.join(subdir))?;
                }
            }
        }
    }

    println!("cloned {nvc} into {}", local_dir.display());
    Ok(())
}

fn dispatch_tool(action: ToolAction, workspace: &Workspace, registry: &Registry) -> anyhow::Result<()> {
    match action {
        ToolAction::List(args) => {
            let catalog = load_catalog(registry, args.all)?;
            let mut nvcs: Vec<&Nvc> = catalog.tools.keys().collect();
            nvcs.sort();
            for nvc in nvcs {
                println!("{nvc}");
            }
            Ok(())
        }
        ToolAction::Show(args) => {
            let catalog = load_catalog(registry, args.all)?;
            let mut index = catalog.sorted_tools();
            let item_ref = item_ref_for(&args.name, args.version.as_deref())?;
            let nvc = selector::select(&item_ref, &mut index, args.cookbook.as_deref(), None)?;
            let tool = catalog
                .tools
                .get(&nvc)
                .ok_or_else(|| anyhow!("'{nvc}' disappeared from the catalog"))?;
            println!("{nvc}");
            println!("  tool_path: {}", tool.tool_path.as_deref().unwrap_or("-"));
            for (host, detection) in &tool.platforms {
                println!(
                    "  {host}: path_checks={:?} command_checks={} file_checks={:?}",
                    detection.path_checks,
                    detection.command_checks.len(),
                    detection.file_checks
                );
            }
            Ok(())
        }
        ToolAction::Clone(args) => clone_tool(&args, registry),
        ToolAction::Check(args) => {
            let catalog = load_catalog(registry, args.all)?;
            let item_ref = item_ref_for(&args.name, args.version.as_deref())?;
            let host = platform::host_platform_tag();
            match tools::validate_tools(std::slice::from_ref(&item_ref), &catalog, host, workspace) {
                Ok(toolchain) => {
                    let resolved = toolchain.get(&item_ref.name).expect("validated tool is present in its own toolchain");
                    println!("{} {} detected", style("✓").green(), resolved.nvc);
                    Ok(())
                }
                Err(e) => {
                    println!("{} {e}", style("✗").red());
                    Err(e.into())
                }
            }
        }
    }
}

fn clone_tool(args: &CloneArgs, registry: &Registry) -> anyhow::Result<()> {
    let catalog = load_catalog(registry, true)?;
    let mut index = catalog.sorted_tools();
    let item_ref = item_ref_for(&args.name, None)?;
    let nvc = selector::select(&item_ref, &mut index, args.cookbook.as_deref(), None)?;
    let tool = catalog
        .tools
        .get(&nvc)
        .ok_or_else(|| anyhow!("'{nvc}' disappeared from the catalog"))?;

    let local_dir = std::env::current_dir()?.join("local");
    std::fs::create_dir_all(&local_dir)?;
    let file_name = tool
        .origin_file
        .file_name()
        .ok_or_else(|| anyhow!("tool has no origin file name"))?;
    std::fs::copy(&tool.origin_file, local_dir.join(file_name))?;

    println!("cloned {nvc} into {}", local_dir.display());
    Ok(())
}

fn dispatch_clean(action: CleanAction, workspace: &Workspace) -> anyhow::Result<()> {
    match action {
        CleanAction::Cache => workspace.clean_cache().map_err(Into::into),
        CleanAction::Install => workspace.clean_install().map_err(Into::into),
        CleanAction::Logs => workspace.clean_logs().map_err(Into::into),
        CleanAction::All => workspace.clean_all().map_err(Into::into),
    }
}

/// Resolves `args` into a plan, validates tools, then builds every recipe in
/// dependency order. Building from an untrusted cookbook is a hard error unless
/// `--all` is passed.
fn build_recipe_tree(args: &ItemArgs, workspace: &Workspace, registry: &Registry) -> anyhow::Result<()> {
    let catalog = load_catalog(registry, true)?;
    let item_ref = item_ref_for(&args.name, args.version.as_deref())?;
    let host = platform::host_platform_tag();

    let plan = planner::plan(std::slice::from_ref(&item_ref), &catalog, host, &args.target)?;

    if !args.all {
        for nvc in plan.flatten() {
            if !registry.is_trusted(&nvc.cookbook) {
                bail!(MusselsError::UntrustedCookbook { name: nvc.cookbook });
            }
        }
    }

    if args.dry_run {
        println!("build plan for {item_ref} on {host}/{}:", args.target);
        for (i, batch) in plan.batches.iter().enumerate() {
            println!("  batch {i}:");
            for nvc in batch {
                println!("    {nvc}");
            }
        }
        return Ok(());
    }

    let required_tools = collect_required_tools(&plan, &catalog, host, &args.target)?;
    let toolchain = tools::validate_tools(&required_tools, &catalog, host, workspace)?;

    let total = plan.flatten().len() as u64;
    let bar = ProgressBar::new(total);
    bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}").unwrap());

    for batch in &plan.batches {
        for nvc in batch {
            let recipe = catalog.recipes.get(nvc).expect("planned recipe is present in catalog");
            let variant = if recipe.kind == RecipeKind::Collection {
                Variant::default()
            } else {
                let declared = recipe.declared_platforms();
                let host_tag = platform::pick_best(host, &declared).expect("planner already validated host platform");
                recipe
                    .variant(host_tag, &args.target)
                    .cloned()
                    .expect("planner already validated target variant")
            };

            bar.set_message(nvc.to_string());
            let outcome = engine::build_recipe(recipe, &variant, &args.target, workspace, &toolchain, args.clean);
            bar.inc(1);

            if outcome.success {
                println!("{} {nvc} ({:.1}s)", style("✓").green(), outcome.elapsed.as_secs_f64());
            } else {
                bar.finish_and_clear();
                println!("{} {nvc} failed", style("✗").red());
                bail!("build failed for {nvc}, see its log under {}", workspace.data_dir.join("logs").join("recipes").display());
            }
        }
    }
    bar.finish_and_clear();
    println!("{} {item_ref} built successfully", style("✓").green());
    Ok(())
}

/// Gathers every `required_tools` entry across the plan's recipe-variants,
/// including collections: a collection runs no build script of its own but
/// still declares tools its members need, per the catalog's variant model.
fn collect_required_tools(plan: &Plan, catalog: &Catalog, host: &str, target: &str) -> anyhow::Result<Vec<ItemRef>> {
    let mut seen = BTreeSet::new();
    let mut refs = Vec::new();
    for nvc in plan.flatten() {
        let recipe = catalog.recipes.get(&nvc).expect("planned recipe is present in catalog");
        let declared = recipe.declared_platforms();
        let Some(host_tag) = platform::pick_best(host, &declared) else {
            continue;
        };
        let Some(variant) = recipe.variant(host_tag, target) else {
            continue;
        };
        for tool_name in &variant.required_tools {
            if seen.insert(tool_name.clone()) {
                refs.push(ItemRef::parse(tool_name).map_err(|e| anyhow!(e))?);
            }
        }
    }
    Ok(refs)
}
