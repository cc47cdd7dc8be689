use std::process::ExitCode;
use std::sync::Arc;

use androsh_fs::{BackendSelector, DirectBackend, FileBackend, FileInfo, ShellBackend};
use androsh_rish::CommandChannel;
use anyhow::{Context, Result, bail};
use tracing::info;

use crate::config::RuntimeConfig;
use crate::{BackendChoice, FsOp};

pub fn check(cfg: &RuntimeConfig) -> Result<ExitCode> {
    let channel = CommandChannel::new(cfg.channel.clone());
    match channel.check_connection() {
        Ok(identity) => {
            println!("connected: {identity}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let assets = &cfg.channel.assets;
            let resources = assets
                .resources_dir
                .as_ref()
                .unwrap_or(&assets.assets_dir);
            eprintln!("{err}");
            eprintln!();
            eprintln!("Action required:");
            eprintln!("  1. Make sure the Shizuku service is running.");
            eprintln!(
                "  2. Export {} from the Shizuku app into {}.",
                assets.payload_name,
                resources.display()
            );
            eprintln!(
                "  3. Authorise {} in Shizuku.",
                cfg.channel.application_id
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

pub fn run(cfg: &RuntimeConfig, command: &str) -> Result<ExitCode> {
    let channel = CommandChannel::new(cfg.channel.clone());
    let result = channel.run(command, cfg.timeout);
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    Ok(ExitCode::from(status_byte(result.exit_code)))
}

pub fn shell(cfg: &RuntimeConfig, command: &str) -> ! {
    CommandChannel::new(cfg.channel.clone()).drun(command)
}

pub fn fs(cfg: &RuntimeConfig, choice: BackendChoice, op: FsOp) -> Result<ExitCode> {
    let selector = build_selector(cfg, choice);
    info!(backends = ?selector.kinds(), "file operation");

    match op {
        FsOp::Exists { path } => Ok(flag(selector.attempt("exists", |b| b.exists(&path)))),
        FsOp::IsFile { path } => Ok(flag(selector.attempt("is_file", |b| b.is_file(&path)))),
        FsOp::IsDir { path } => Ok(flag(selector.attempt("is_dir", |b| b.is_dir(&path)))),
        FsOp::Mkdir { path, parents } => {
            done(selector.attempt("mkdir", |b| b.mkdir(&path, parents)), "mkdir", &path)
        }
        FsOp::Rm {
            path,
            recursive,
            force,
        } => done(
            selector.attempt("remove", |b| b.remove(&path, recursive, force)),
            "rm",
            &path,
        ),
        FsOp::Clean { path } => done(
            selector.attempt("clean_dir", |b| b.clean_dir(&path)),
            "clean",
            &path,
        ),
        FsOp::Cp {
            src,
            dst,
            recursive,
        } => done(
            selector.attempt("copy", |b| b.copy(&src, &dst, recursive)),
            "cp",
            &src,
        ),
        FsOp::Mv { src, dst } => {
            done(selector.attempt("move", |b| b.move_path(&src, &dst)), "mv", &src)
        }
        FsOp::Rename { path, new_name } => done(
            selector.attempt("rename", |b| b.rename(&path, &new_name)),
            "rename",
            &path,
        ),
        FsOp::Chmod {
            mode,
            path,
            recursive,
        } => done(
            selector.attempt("chmod", |b| b.chmod(&path, mode, recursive)),
            "chmod",
            &path,
        ),
        FsOp::Chown {
            owner,
            path,
            group,
            recursive,
        } => done(
            selector.attempt("chown", |b| {
                b.chown(&path, &owner, group.as_deref(), recursive)
            }),
            "chown",
            &path,
        ),
        FsOp::Cat { path } => {
            let text = selector
                .first("read", |b| b.read(&path))
                .with_context(|| format!("cannot read {path}"))?;
            print!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        FsOp::Write { path, content } => done(
            selector.attempt("write", |b| b.write(&path, &content)),
            "write",
            &path,
        ),
        FsOp::Append { path, content } => done(
            selector.attempt("append", |b| b.append(&path, &content)),
            "append",
            &path,
        ),
        FsOp::Ls { path, pattern } => {
            if !selector.attempt("is_dir", |b| b.is_dir(&path)) {
                bail!("not a directory: {path}");
            }
            let mut names = selector
                .first("list_dir", |b| {
                    let names = b.list_dir(&path, pattern.as_deref());
                    (!names.is_empty()).then_some(names)
                })
                .unwrap_or_default();
            names.sort();
            for name in names {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        FsOp::Checksum { path, algo } => {
            let digest = selector
                .checksum(&path, algo)
                .with_context(|| format!("cannot compute {algo} of {path}"))?;
            println!("{digest}  {path}");
            Ok(ExitCode::SUCCESS)
        }
        FsOp::Verify { path, digest, algo } => {
            let ok = selector.verify_checksum(&path, &digest, algo);
            if !ok {
                eprintln!("{path}: {algo} mismatch");
            }
            Ok(flag(ok))
        }
        FsOp::Info { path, json } => {
            let info = selector
                .first("info", |b| b.get_info(&path))
                .with_context(|| format!("cannot stat {path}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_info(&info);
            }
            Ok(ExitCode::SUCCESS)
        }
        FsOp::Ln { target, link } => done(
            selector.attempt("create_symlink", |b| b.create_symlink(&target, &link)),
            "ln",
            &link,
        ),
        FsOp::Readlink { link } => {
            let target = selector
                .first("read_symlink", |b| b.read_symlink(&link))
                .with_context(|| format!("cannot read link {link}"))?;
            println!("{target}");
            Ok(ExitCode::SUCCESS)
        }
        FsOp::Untar { archive, target } => done(
            selector.attempt("tar_extract", |b| b.tar_extract(&archive, &target)),
            "untar",
            &archive,
        ),
        FsOp::Df { path } => {
            let usage = selector
                .first("disk_usage", |b| b.disk_usage(&path))
                .with_context(|| format!("cannot read disk usage for {path}"))?;
            println!(
                "{} {}K total, {}K used, {}K available ({}%) on {}",
                usage.filesystem,
                usage.total_kb,
                usage.used_kb,
                usage.available_kb,
                usage.use_percent,
                usage.mount_point
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_selector(cfg: &RuntimeConfig, choice: BackendChoice) -> BackendSelector {
    let channel = Arc::new(CommandChannel::new(cfg.channel.clone()));
    let direct = || Box::new(DirectBackend::new()) as Box<dyn FileBackend>;
    let busybox = || {
        Box::new(
            ShellBackend::busybox(Arc::clone(&channel), cfg.busybox.clone())
                .with_timeout(cfg.timeout),
        ) as Box<dyn FileBackend>
    };
    let raw = || {
        Box::new(ShellBackend::raw(Arc::clone(&channel)).with_timeout(cfg.timeout))
            as Box<dyn FileBackend>
    };

    let backends = match choice {
        BackendChoice::Auto => vec![direct(), busybox(), raw()],
        BackendChoice::Direct => vec![direct()],
        BackendChoice::Busybox => vec![busybox()],
        BackendChoice::Shell => vec![raw()],
    };
    BackendSelector::new(backends)
}

fn print_info(info: &FileInfo) {
    println!("name:     {}", info.name);
    println!("kind:     {:?}", info.kind);
    println!("size:     {}", info.size);
    if let Some(mode) = info.mode {
        println!("mode:     {mode:o}");
    }
    if let Some(owner) = info.owner {
        println!("owner:    {owner}");
    }
    if let Some(group) = info.group {
        println!("group:    {group}");
    }
    if let Some(modified) = info.modified {
        println!("modified: {modified}");
    }
}

fn flag(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn done(ok: bool, op: &str, path: &str) -> Result<ExitCode> {
    if !ok {
        bail!("{op} failed: {path}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Statuses outside 0..=255 collapse to 1.
fn status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
