use std::{future::Future, pin::Pin};

use ai_llm_service::{AiLlmError, LlmService};

/// Text-in/text-out completion backend used by the fallback extractor.
///
/// Implement this trait to plug in a model client, or a scripted double in
/// tests.
pub trait CompletionProvider: Send + Sync {
    /// One completion for `prompt`, with an optional system instruction.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiLlmError>> + Send + 'a>>;

    /// Short label for logs.
    fn name(&self) -> String {
        "custom".to_string()
    }
}

impl CompletionProvider for LlmService {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiLlmError>> + Send + 'a>> {
        Box::pin(self.generate(prompt, system))
    }

    fn name(&self) -> String {
        format!("{}:{}", self.config().provider, self.config().model)
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    /// What the scripted provider does on a call.
    pub enum Reply {
        Text(String),
        Fail(AiLlmError),
        Sleep(Duration),
        Panic,
    }

    /// Test double replaying one reply per call; the last reply repeats.
    pub struct ScriptedProvider {
        replies: Mutex<Vec<Reply>>,
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn text(s: &str) -> Self {
            Self::new(vec![Reply::Text(s.to_string())])
        }

        fn next(&self) -> Reply {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                return replies.remove(0);
            }
            match replies.first() {
                Some(Reply::Text(s)) => Reply::Text(s.clone()),
                Some(Reply::Sleep(d)) => Reply::Sleep(*d),
                Some(Reply::Panic) => Reply::Panic,
                Some(Reply::Fail(e)) => Reply::Fail(AiLlmError::Timeout(match e {
                    AiLlmError::Timeout(d) => *d,
                    _ => Duration::from_secs(1),
                })),
                None => Reply::Text(String::new()),
            }
        }
    }

    impl CompletionProvider for ScriptedProvider {
        fn complete<'a>(
            &'a self,
            prompt: &'a str,
            _system: Option<&'a str>,
        ) -> Pin<Box<dyn Future<Output = Result<String, AiLlmError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = self.next();
            Box::pin(async move {
                match reply {
                    Reply::Text(s) => Ok(s),
                    Reply::Fail(e) => Err(e),
                    Reply::Sleep(d) => {
                        tokio::time::sleep(d).await;
                        Ok("{}".to_string())
                    }
                    Reply::Panic => panic!("scripted provider panic"),
                }
            })
        }

        fn name(&self) -> String {
            "scripted".to_string()
        }
    }
}
