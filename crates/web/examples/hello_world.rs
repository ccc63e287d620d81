use onion_web::{Application, Context, Error, Next};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut app = Application::new();
    app.use_middleware(|ctx: Context, _next: Next| async move {
        ctx.set_body("Hello World!");
        Ok::<(), Error>(())
    });

    app.listen("127.0.0.1:3000").await?.join().await
}
