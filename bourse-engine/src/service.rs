use bourse_integration::{Replier, ReplyContext, Router};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Serve a bound [`Replier`] with `router` until `online` clears or the
/// socket dies. Each accepted peer gets its own context task, so several
/// in-flight exchanges can run concurrently on one address.
pub(crate) fn spawn_replier_service(
    replier: Arc<Replier>,
    router: Arc<Router>,
    online: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while online.load(Ordering::Acquire) {
            match replier.accept().await {
                Ok(context) => {
                    tokio::spawn(serve_context(
                        context,
                        Arc::clone(&router),
                        Arc::clone(&online),
                    ));
                }
                Err(error) if error.is_timeout() => continue,
                Err(error) => {
                    if online.load(Ordering::Acquire) {
                        warn!(%error, "replier accept failed, service exiting");
                    }
                    return;
                }
            }
        }
    })
}

async fn serve_context(mut context: ReplyContext, router: Arc<Router>, online: Arc<AtomicBool>) {
    let peer = context.peer();
    debug!(%peer, "peer connected");

    while online.load(Ordering::Acquire) {
        let request = match context.recv().await {
            Ok(request) => request,
            Err(error) if error.is_timeout() => continue,
            Err(error) => {
                if error.is_closed() {
                    debug!(%peer, "peer disconnected");
                } else {
                    warn!(%peer, %error, "dropping peer");
                }
                return;
            }
        };

        info!(%peer, task = %request.task, "received task");
        let response = router.route(request).await;
        if let Err(error) = context.send(&response).await {
            warn!(%peer, %error, "failed to send response");
            return;
        }
    }
}
