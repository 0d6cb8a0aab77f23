pub async fn sleep(duration: std::time::Duration) {
    smol::Timer::after(duration).await;
}
