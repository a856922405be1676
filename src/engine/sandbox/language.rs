use std::sync::Arc;

pub const MOUNT_PATH: &str = "/app";
pub const STDIN_FILE: &str = "input.txt";
pub const COMPILE_FAILURE_MARKER: &str = "compilation failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    Compiled,
    Interpreted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub source_name: &'static str,
    pub image: &'static str,
    pub family: LanguageFamily,
    pub build: Option<&'static str>,
    pub run: &'static str,
}

impl LanguageProfile {
    pub fn command(&self, dir: &str, has_stdin: bool) -> String {
        let dir = shell_quote(dir);
        let dir = dir.as_str();
        let mut run = self.run.replace("{dir}", dir);
        if has_stdin {
            run.push_str(&format!(" < {dir}/{STDIN_FILE}"));
        }
        match self.build {
            Some(build) => format!(
                "{} || {{ echo '{COMPILE_FAILURE_MARKER}' >&2; exit 1; }}; {run}",
                build.replace("{dir}", dir)
            ),
            None => run,
        }
    }
}

fn shell_quote(raw: &str) -> String {
    let plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+'));
    if plain {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}

pub const UNSUPPORTED: LanguageProfile = LanguageProfile {
    id: "unsupported",
    aliases: &[],
    source_name: "main.txt",
    image: "alpine:3.20",
    family: LanguageFamily::Interpreted,
    build: None,
    run: "echo 'unsupported language' >&2; exit 1",
};

pub const BUILTIN_PROFILES: &[LanguageProfile] = &[
    LanguageProfile {
        id: "python",
        aliases: &["py", "python3"],
        source_name: "main.py",
        image: "python:3.12.10-alpine",
        family: LanguageFamily::Interpreted,
        build: None,
        run: "python {dir}/main.py",
    },
    LanguageProfile {
        id: "javascript",
        aliases: &["js", "node"],
        source_name: "index.js",
        image: "node:22.16.0-alpine",
        family: LanguageFamily::Interpreted,
        build: None,
        run: "node {dir}/index.js",
    },
    LanguageProfile {
        id: "java",
        aliases: &[],
        source_name: "Main.java",
        image: "openjdk:17-jdk-slim",
        family: LanguageFamily::Compiled,
        build: Some("javac {dir}/Main.java"),
        run: "java -classpath {dir} Main",
    },
    LanguageProfile {
        id: "cpp",
        aliases: &["c++", "cxx"],
        source_name: "main.cpp",
        image: "gcc:14",
        family: LanguageFamily::Compiled,
        build: Some("g++ -O2 -o {dir}/a.out {dir}/main.cpp"),
        run: "{dir}/a.out",
    },
    LanguageProfile {
        id: "c",
        aliases: &[],
        source_name: "main.c",
        image: "gcc:14",
        family: LanguageFamily::Compiled,
        build: Some("gcc -O2 -o {dir}/a.out {dir}/main.c -lm"),
        run: "{dir}/a.out",
    },
    LanguageProfile {
        id: "go",
        aliases: &["golang"],
        source_name: "main.go",
        image: "golang:1.22-alpine",
        family: LanguageFamily::Compiled,
        build: Some("go build -o {dir}/main {dir}/main.go"),
        run: "{dir}/main",
    },
    LanguageProfile {
        id: "rust",
        aliases: &["rs"],
        source_name: "main.rs",
        image: "rust:1.76-alpine",
        family: LanguageFamily::Compiled,
        build: Some("rustc -O -o {dir}/main {dir}/main.rs"),
        run: "{dir}/main",
    },
    LanguageProfile {
        id: "shell",
        aliases: &["sh", "bash"],
        source_name: "main.sh",
        image: "alpine:3.20",
        family: LanguageFamily::Interpreted,
        build: None,
        run: "sh {dir}/main.sh",
    },
];

#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: Arc<[LanguageProfile]>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::with_profiles(BUILTIN_PROFILES.to_vec())
    }
}

impl LanguageRegistry {
    pub fn with_profiles(profiles: Vec<LanguageProfile>) -> Self {
        Self {
            profiles: profiles.into(),
        }
    }

    pub fn resolve(&self, language: &str) -> LanguageProfile {
        let wanted = language.trim().to_ascii_lowercase();
        self.profiles
            .iter()
            .find(|p| p.id == wanted || p.aliases.iter().any(|alias| *alias == wanted))
            .cloned()
            .unwrap_or_else(|| {
                tracing::warn!(language = %language, "unsupported language requested");
                UNSUPPORTED
            })
    }

    pub fn languages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.profiles.iter().map(|p| p.id)
    }
}
