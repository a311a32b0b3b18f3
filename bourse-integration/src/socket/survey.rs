use crate::{
    config::SocketConfig,
    error::SocketError,
    frame::{read_frame, write_frame},
    message::{Request, Response},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};
use tracing::{debug, warn};

/// SURVEYOR endpoint: broadcasts a deadline-bounded request to every
/// connected respondent and collects their replies.
///
/// A respondent that fails to answer within the deadline is dropped from the
/// set; the survey itself fails if fewer than the expected number of
/// responses arrive, leaving the caller to decide whether the pool is still
/// coherent.
#[derive(Debug)]
pub struct Surveyor {
    respondents: Arc<Mutex<Vec<TcpStream>>>,
    accept_task: JoinHandle<()>,
    config: SocketConfig,
}

impl Surveyor {
    pub async fn bind(mut config: SocketConfig) -> Result<Self, SocketError> {
        let listener = super::bind(&mut config).await?;
        let respondents = Arc::new(Mutex::new(Vec::new()));
        let accept_task = tokio::spawn(accept_respondents(listener, Arc::clone(&respondents)));

        Ok(Self {
            respondents,
            accept_task,
            config,
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub async fn respondent_count(&self) -> usize {
        self.respondents.lock().await.len()
    }

    /// Emit `request` to all respondents and collect one reply each within
    /// `deadline`. Fails with [`SocketError::Survey`] when fewer than
    /// `expected` replies arrive.
    pub async fn survey(
        &self,
        request: &Request,
        expected: usize,
        deadline: Duration,
    ) -> Result<Vec<Response>, SocketError> {
        let payload = request.dump()?;
        let mut respondents = self.respondents.lock().await;

        let mut surveyed = Vec::with_capacity(respondents.len());
        for mut stream in respondents.drain(..) {
            match write_frame(&mut stream, &payload, self.config.send_deadline()).await {
                Ok(()) => surveyed.push(stream),
                Err(error) => {
                    warn!(task = %request.task, %error, "dropping unreachable respondent");
                }
            }
        }

        let collects: Vec<_> = surveyed
            .iter_mut()
            .map(|stream| async move {
                let frame = read_frame(stream, deadline).await?;
                Response::load(&frame)
            })
            .collect();
        let results = futures::future::join_all(collects).await;

        let mut responses = Vec::with_capacity(results.len());
        for (stream, result) in surveyed.into_iter().zip(results) {
            match result {
                Ok(response) => {
                    responses.push(response);
                    respondents.push(stream);
                }
                Err(error) => {
                    warn!(task = %request.task, %error, "respondent missed the survey deadline");
                }
            }
        }

        if responses.len() < expected {
            return Err(SocketError::Survey {
                task: request.task.clone(),
                expected,
                received: responses.len(),
            });
        }

        Ok(responses)
    }
}

impl Drop for Surveyor {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_respondents(listener: TcpListener, respondents: Arc<Mutex<Vec<TcpStream>>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "respondent connected");
                if stream.set_nodelay(true).is_ok() {
                    respondents.lock().await.push(stream);
                }
            }
            Err(error) => {
                warn!(%error, "surveyor accept failed");
                return;
            }
        }
    }
}

/// RESPONDENT endpoint: dials a surveyor, receives surveys and answers them.
#[derive(Debug)]
pub struct Respondent {
    stream: Mutex<TcpStream>,
    config: SocketConfig,
}

impl Respondent {
    pub async fn connect(config: SocketConfig) -> Result<Self, SocketError> {
        let stream = super::dial(&config).await?;
        Ok(Self {
            stream: Mutex::new(stream),
            config,
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub async fn recv(&self) -> Result<Request, SocketError> {
        let mut stream = self.stream.lock().await;
        let frame = read_frame(&mut *stream, self.config.recv_deadline()).await?;
        Request::load(&frame)
    }

    pub async fn send(&self, response: &Response) -> Result<(), SocketError> {
        let payload = response.dump()?;
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &payload, self.config.send_deadline()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketPattern;

    async fn connected_pair(count: usize) -> (Surveyor, Vec<Respondent>) {
        let surveyor = Surveyor::bind(SocketConfig::listener(SocketPattern::Surveyor))
            .await
            .expect("bind");
        let dialer = surveyor.config().to_dialer(SocketPattern::Respondent);

        let mut respondents = Vec::with_capacity(count);
        for _ in 0..count {
            respondents.push(Respondent::connect(dialer.clone()).await.expect("connect"));
        }
        while surveyor.respondent_count().await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        (surveyor, respondents)
    }

    #[tokio::test]
    async fn test_survey_collects_all_responses() {
        let (surveyor, respondents) = connected_pair(3).await;

        let answering: Vec<_> = respondents
            .into_iter()
            .map(|respondent| {
                tokio::spawn(async move {
                    let survey = respondent.recv().await.expect("recv");
                    respondent
                        .send(&Response::ok(survey.task))
                        .await
                        .expect("send");
                })
            })
            .collect();

        let responses = surveyor
            .survey(&Request::new("configure"), 3, Duration::from_secs(1))
            .await
            .expect("survey");
        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|response| response.task == "configure"));

        for task in answering {
            task.await.expect("respondent");
        }
    }

    #[tokio::test]
    async fn test_missing_response_fails_the_survey() {
        let (surveyor, respondents) = connected_pair(2).await;

        // Only one respondent answers; the other keeps the survey pending.
        let [answers, silent]: [Respondent; 2] =
            respondents.try_into().expect("two respondents");
        let answering = tokio::spawn(async move {
            let survey = answers.recv().await.expect("recv");
            answers.send(&Response::ok(survey.task)).await.expect("send");
        });

        let error = surveyor
            .survey(&Request::new("run_backtest"), 2, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            SocketError::Survey {
                expected: 2,
                received: 1,
                ..
            }
        ));

        answering.await.expect("respondent");
        drop(silent);
    }
}
