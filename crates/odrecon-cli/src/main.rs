use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use odrecon_core::{
	reconstruct_cache, reconstruct_sync, CacheTree, EntryKind, OrphanPolicy, ReconConfig,
	SyncSnapshot,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "odrecon", version, about = "Rebuild OneDrive folder hierarchies from client artifacts")]
struct Cli {
	/// Enable debug logging
	#[arg(short, long, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Rebuild the folder tree held in a local cache artifact
	Tree {
		/// Path to the cache artifact
		artifact: PathBuf,
		/// Account settings directory used to confirm the tree root
		#[arg(long)]
		sync: Option<PathBuf>,
		/// Print the tree as JSON
		#[arg(long)]
		json: bool,
		/// Fail if any entry's parent is never found
		#[arg(long)]
		strict: bool,
		/// Refuse artifacts larger than this many bytes
		#[arg(long)]
		max_bytes: Option<u64>,
	},
	/// Show the detail text of one entry
	Details {
		/// Path to the cache artifact
		artifact: PathBuf,
		/// Object identifier of the entry
		object_id: String,
	},
	/// Join the sync engine databases of one account directory
	Sync {
		/// Directory holding SyncEngineDatabase.db and SafeDelete.db
		dir: PathBuf,
		/// Account name (defaults to the directory name; "Personal" selects SHA1 hashes)
		#[arg(long)]
		account: Option<String>,
		/// Print everything as JSON
		#[arg(long)]
		json: bool,
	},
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let default_level = if cli.verbose { "debug" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.init();

	match cli.command {
		Commands::Tree { artifact, sync, json, strict, max_bytes } => {
			let mut config = ReconConfig::default();
			if strict {
				config.orphan_policy = OrphanPolicy::Strict;
			}
			if let Some(max_bytes) = max_bytes {
				config.max_artifact_bytes = max_bytes;
			}

			let assembled = reconstruct_cache(&artifact, &config)?;

			if let Some(dir) = sync {
				let snapshot = reconstruct_sync(&dir, &config);
				if assembled.tree.root_confirmed_by(snapshot.known_ids()) {
					tracing::info!("Root {} confirmed by {}", assembled.tree.root().object_id, snapshot.account);
				} else {
					tracing::warn!(
						"Root {} is not a known identifier in {}; the tree root is a guess",
						assembled.tree.root().object_id,
						dir.display()
					);
				}
			}

			if json {
				let mut stdout = std::io::stdout().lock();
				assembled.tree.write_json(&mut stdout, true)?;
				writeln!(stdout)?;
			} else {
				print_tree(&assembled.tree);
				println!();
				println!("📁 Entries: {}", assembled.tree.len() - 1);
				if !assembled.orphans.is_empty() {
					println!("⚠️  Orphans: {}", assembled.orphans.len());
					for orphan in &assembled.orphans {
						println!("   {} ({}) -> missing parent {}", orphan.name, orphan.object_id, orphan.folder_id);
					}
				}
			}
		}
		Commands::Details { artifact, object_id } => {
			let assembled = reconstruct_cache(&artifact, &ReconConfig::default())?;
			let entry = assembled
				.tree
				.find(&object_id)
				.or_else(|| assembled.orphans.iter().find(|o| o.object_id == object_id))
				.with_context(|| format!("No entry with object id {}", object_id))?;
			println!("{}", entry.details());
		}
		Commands::Sync { dir, account, json } => {
			let config = ReconConfig { account, ..Default::default() };
			let snapshot = reconstruct_sync(&dir, &config);

			if json {
				println!("{}", serde_json::to_string_pretty(&snapshot)?);
			} else {
				print_snapshot(&snapshot)?;
			}
		}
	}
	Ok(())
}

fn print_tree(tree: &CacheTree) {
	for (depth, entry) in tree.walk() {
		let marker = match entry.kind {
			EntryKind::Folder => "📁",
			EntryKind::File => "📄",
		};
		println!("{}{} {}", "  ".repeat(depth), marker, entry.name);
	}
}

fn print_snapshot(snapshot: &SyncSnapshot) -> Result<()> {
	println!("👤 Account: {} ({:?})", snapshot.account, snapshot.profile);
	println!("🔑 Scopes: {}", snapshot.scope_ids.join(", "));
	println!();

	for record in snapshot.all_records() {
		println!("{}", serde_json::to_string(&record)?);
	}

	println!();
	println!("📈 Records: {}", snapshot.records.len());
	println!("🗑️  Deleted: {}", snapshot.deleted.len());
	println!("🧾 Graph metadata rows: {}", snapshot.graph_metadata.len());
	if !snapshot.unresolved.is_empty() {
		println!("⚠️  Unresolved paths: {}", snapshot.unresolved.len());
	}
	Ok(())
}
