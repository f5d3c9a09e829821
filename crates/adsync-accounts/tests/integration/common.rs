//! Shared helpers: temporary account tables and a fake shadow-utils runner

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use adsync_accounts::command::{CommandLine, CommandOutput, CommandRunner};
use adsync_accounts::LinuxAccountBackend;
use adsync_core::config::LinuxFilesConfig;
use adsync_core::domain::AccountError;

pub const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
";

pub const SHADOW: &str = "\
root:*:19000:0:99999:7:::
daemon:*:19000:0:99999:7:::
";

pub const GROUP: &str = "\
root:x:0:
daemon:x:1:
";

/// Account tables in a temporary directory
pub struct Tables {
    _dir: TempDir,
    pub files: LinuxFilesConfig,
}

impl Tables {
    pub fn new() -> Self {
        Self::with(PASSWD, SHADOW, GROUP)
    }

    pub fn with(passwd: &str, shadow: &str, group: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = LinuxFilesConfig {
            passwd: dir.path().join("passwd"),
            shadow: dir.path().join("shadow"),
            group: dir.path().join("group"),
        };
        std::fs::write(&files.passwd, passwd).unwrap();
        std::fs::write(&files.shadow, shadow).unwrap();
        std::fs::write(&files.group, group).unwrap();
        Self { _dir: dir, files }
    }

    pub fn passwd(&self) -> String {
        std::fs::read_to_string(&self.files.passwd).unwrap()
    }

    pub fn shadow(&self) -> String {
        std::fs::read_to_string(&self.files.shadow).unwrap()
    }

    pub fn group(&self) -> String {
        std::fs::read_to_string(&self.files.group).unwrap()
    }
}

fn lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn write_lines(path: &Path, lines: &[String]) {
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).unwrap();
}

fn field(line: &str, index: usize) -> &str {
    line.split(':').nth(index).unwrap_or("")
}

fn next_id(lines: &[String], index: usize) -> u32 {
    lines
        .iter()
        .filter_map(|l| field(l, index).parse::<u32>().ok())
        .filter(|id| *id >= 1000)
        .max()
        .map_or(1000, |id| id + 1)
}

/// Applies shadow-utils commands to the temporary tables
pub struct FakeShadowUtils {
    passwd: PathBuf,
    shadow: PathBuf,
    group: PathBuf,
    commands: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl FakeShadowUtils {
    pub fn new(files: &LinuxFilesConfig) -> Self {
        Self {
            passwd: files.passwd.clone(),
            shadow: files.shadow.clone(),
            group: files.group.clone(),
            commands: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    /// Makes every invocation of `program` exit unsuccessfully
    pub fn failing_on(mut self, program: &'static str) -> Self {
        self.fail_on = Some(program);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn groupadd(&self, name: &str) -> u32 {
        let mut groups = lines(&self.group);
        let gid = next_id(&groups, 2);
        groups.push(format!("{name}:x:{gid}:"));
        write_lines(&self.group, &groups);
        gid
    }

    fn useradd(&self, args: &[String]) {
        let name = args.last().unwrap().clone();
        let mut primary = None;
        let mut supplementary = Vec::new();
        let mut shell = "/bin/sh".to_string();
        let mut iter = args[..args.len() - 1].iter();
        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "-g" => primary = iter.next().cloned(),
                "-G" => supplementary = iter.next().unwrap().split(',').map(str::to_string).collect(),
                "-s" => shell = iter.next().unwrap().clone(),
                "-c" | "-d" | "-K" => {
                    iter.next();
                }
                _ => {}
            }
        }

        let gid = match primary {
            Some(group) => lines(&self.group)
                .iter()
                .find(|l| field(l, 0) == group)
                .map(|l| field(l, 2).parse().unwrap())
                .expect("primary group exists"),
            None => self.groupadd(&name),
        };

        let mut users = lines(&self.passwd);
        let uid = next_id(&users, 2);
        users.push(format!("{name}:x:{uid}:{gid}::/home/{name}:{shell}"));
        write_lines(&self.passwd, &users);

        let mut shadow = lines(&self.shadow);
        shadow.push(format!("{name}:!:19000:0:99999:7:::"));
        write_lines(&self.shadow, &shadow);

        let groups: Vec<String> = lines(&self.group)
            .into_iter()
            .map(|l| {
                if supplementary.iter().any(|g| g == field(&l, 0)) {
                    if l.ends_with(':') {
                        format!("{l}{name}")
                    } else {
                        format!("{l},{name}")
                    }
                } else {
                    l
                }
            })
            .collect();
        write_lines(&self.group, &groups);
    }

    fn userdel(&self, name: &str) {
        let users = lines(&self.passwd);
        let gid = users
            .iter()
            .find(|l| field(l, 0) == name)
            .map(|l| field(l, 3).to_string());
        write_lines(
            &self.passwd,
            &users.into_iter().filter(|l| field(l, 0) != name).collect::<Vec<_>>(),
        );
        write_lines(
            &self.shadow,
            &lines(&self.shadow)
                .into_iter()
                .filter(|l| field(l, 0) != name)
                .collect::<Vec<_>>(),
        );

        // USERGROUPS_ENAB: drop the private group, strip supplementary membership
        let groups: Vec<String> = lines(&self.group)
            .into_iter()
            .filter(|l| !(field(l, 0) == name && Some(field(l, 2).to_string()) == gid))
            .map(|l| {
                let mut parts: Vec<String> = l.split(':').map(str::to_string).collect();
                if parts.len() >= 4 {
                    parts[3] = parts[3]
                        .split(',')
                        .filter(|m| !m.is_empty() && *m != name)
                        .collect::<Vec<_>>()
                        .join(",");
                }
                parts.join(":")
            })
            .collect();
        write_lines(&self.group, &groups);
    }

    fn groupdel(&self, name: &str) {
        write_lines(
            &self.group,
            &lines(&self.group)
                .into_iter()
                .filter(|l| field(l, 0) != name)
                .collect::<Vec<_>>(),
        );
    }
}

#[async_trait]
impl CommandRunner for FakeShadowUtils {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, AccountError> {
        self.commands.lock().unwrap().push(command.to_string());
        if self.fail_on == Some(command.program()) {
            return Err(AccountError::CommandFailed {
                command: command.to_string(),
                message: "exit status: 1".into(),
            });
        }

        let args = command.get_args();
        let target = args.last().cloned().unwrap_or_default();
        match command.program() {
            "useradd" => self.useradd(args),
            "userdel" => self.userdel(&target),
            "groupadd" => {
                self.groupadd(&target);
            }
            "groupdel" => self.groupdel(&target),
            other => panic!("unexpected command {other}"),
        }
        Ok(CommandOutput::default())
    }
}

/// Backend plus its fake runner over fresh tables
pub fn linux_backend(tables: &Tables) -> (Arc<FakeShadowUtils>, LinuxAccountBackend) {
    let runner = Arc::new(FakeShadowUtils::new(&tables.files));
    let backend = LinuxAccountBackend::new(tables.files.clone(), runner.clone());
    (runner, backend)
}
