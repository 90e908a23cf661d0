//! Watch command - the main publish loop.

use std::future::Future;
use std::sync::Arc;

use crate::cli::WatchArgs;
use crate::config::{Settings, WatchStrategy};
use crate::git::GitPublisher;
use crate::watcher::{AllowList, AutoPushWatcher, NotifySource, PollSource, PublishHandler, WatchSummary};

/// Apply command-line overrides on top of the loaded settings.
pub fn apply_overrides(settings: &mut Settings, args: &WatchArgs) {
    if !args.files.is_empty() {
        settings.watch.files = args.files.clone();
    }
    if let Some(delay) = args.delay {
        settings.watch.quiet_period_secs = delay;
    }
    if args.poll {
        settings.watch.strategy = WatchStrategy::Poll;
    }
    if let Some(interval) = args.interval {
        settings.watch.poll_interval_secs = interval;
    }
    if let Some(remote) = &args.remote {
        settings.git.remote = remote.clone();
    }
    if let Some(branch) = &args.branch {
        settings.git.branch = branch.clone();
    }
}

/// Run preflight, then watch until `shutdown` resolves.
pub async fn run(
    settings: &Settings,
    shutdown: impl Future<Output = ()> + Send,
) -> anyhow::Result<WatchSummary> {
    let report = super::check::run_preflight(settings).await?;
    let root = settings.root();

    let reader = if settings.encoding.probe {
        Some(settings.encoding.reader()?)
    } else {
        None
    };
    let publisher = Arc::new(GitPublisher::new(super::git_backend(settings), &settings.git));
    let handler = Arc::new(PublishHandler::new(publisher, reader));
    let mut allow_list = AllowList::new(&root, &settings.watch.files);
    if let Some(log_file) = settings.logging.file_path(&root) {
        allow_list = allow_list.ignore(log_file);
    }

    let builder = AutoPushWatcher::builder()
        .allow_list(allow_list.clone())
        .handler(handler)
        .quiet_period(settings.watch.quiet_period());

    let builder = match settings.watch.strategy {
        WatchStrategy::Event => builder.source(NotifySource::new(allow_list.watch_dirs())),
        WatchStrategy::Poll => {
            let files = allow_list.names().map(|name| allow_list.resolve(name)).collect();
            builder.source(PollSource::new(files, settings.watch.poll_interval()))
        }
    };

    crate::log_event!(
        "watch",
        "publishing",
        "{} file(s) to {}/{}",
        report.present.len() + report.missing.len(),
        settings.git.remote,
        settings.git.branch
    );

    let summary = builder.build()?.watch(shutdown).await?;
    Ok(summary)
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be installed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[watch] cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
