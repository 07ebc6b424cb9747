use std::io;

/// Runs `task` until it finishes or `interrupt` fires.
///
/// An interrupt turns into an `Interrupted` error, so a process stopped halfway never
/// reports success.
pub async fn until_interrupted<T, E, F, S>(task: F, interrupt: S) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    S: Future<Output = io::Result<()>>,
    E: From<io::Error>,
{
    tokio::select! {
        ret = task => ret,
        signal = interrupt => {
            signal?;
            Err(io::Error::new(io::ErrorKind::Interrupted, "stopped by user").into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future;

    use super::*;

    #[tokio::test]
    async fn interrupt_is_an_error() {
        let task = future::pending::<io::Result<()>>();
        let res = until_interrupted(task, async { Ok(()) }).await;

        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::Interrupted);
    }

    #[tokio::test]
    async fn finished_task_keeps_its_result() {
        let task = async { io::Result::Ok(7) };
        let res = until_interrupted(task, future::pending()).await;

        assert_eq!(res.unwrap(), 7);
    }
}
