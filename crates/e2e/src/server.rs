//! App-under-test management - spawning the todo server and waiting for it

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::info;

use todo_common::TodoClient;

use crate::config::ServerConfig;
use crate::error::{E2eError, E2eResult};

/// Handle to a running app-under-test process
pub struct ServerHandle {
    child: Child,
}

impl ServerHandle {
    /// Spawn the configured command and wait until the endpoint answers
    pub async fn spawn(
        config: &ServerConfig,
        client: &TodoClient,
        startup_timeout: Duration,
    ) -> E2eResult<Self> {
        info!("Spawning app under test: {}", config.command.display());

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.command.display(),
                e
            ))
        })?;

        let mut handle = ServerHandle { child };

        if let Err(e) = client.wait_until_ready(startup_timeout).await {
            handle.stop()?;
            return Err(E2eError::ServerStartup(e.to_string()));
        }

        info!("App under test is answering at {}", client.base_url());
        Ok(handle)
    }

    /// Stop the process: SIGTERM first, then kill
    pub fn stop(&mut self) -> E2eResult<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }

        info!("Stopping app under test (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
