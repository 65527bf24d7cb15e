//! Roundtrip serialisation tests for `nexus-core` types.
//!
//! Each `#[case]` is isolated — no shared state.

use chrono::Utc;
use nexus_core::types::{
    Preferences, Registry, ServerDefinition, ServerId, ServerSource, TargetId, TargetSettings,
    Transport,
};
use rstest::rstest;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Fixture registries
// ---------------------------------------------------------------------------

fn bare_registry() -> Registry {
    let now = Utc::now();
    Registry {
        version: 1,
        created_at: now,
        updated_at: now,
        ..Registry::default()
    }
}

fn populated_registry() -> Registry {
    let now = Utc::now();
    let mut env = HashMap::new();
    env.insert("GITHUB_TOKEN".to_string(), "keychain:github".to_string());
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer keychain:linear".to_string());

    let mut stdio = ServerDefinition::new(
        ServerId::from("github"),
        "GitHub".to_string(),
        ServerSource::Npm {
            package: "@modelcontextprotocol/server-github".to_string(),
            version: Some("2025.1.0".to_string()),
        },
        Transport::Stdio {
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@modelcontextprotocol/server-github".to_string()],
            env,
        },
    );
    stdio.description = Some("Issues and pull requests".to_string());
    stdio.enabled_targets = vec![TargetId::ClaudeCode, TargetId::Cursor, TargetId::Warp];
    stdio.version = Some("2025.1.0".to_string());

    let mut sse = ServerDefinition::new(
        ServerId::from("linear"),
        "Linear".to_string(),
        ServerSource::Remote { url: "https://mcp.linear.app/sse".to_string() },
        Transport::Sse {
            url: "https://mcp.linear.app/sse".to_string(),
            headers,
        },
    );
    sse.enabled_targets = vec![TargetId::ClaudeDesktop];

    let mut registry = bare_registry();
    registry.servers = vec![stdio, sse];
    registry.targets.insert(
        TargetId::Cursor,
        TargetSettings {
            enabled: true,
            last_sync: Some(now),
            last_sync_checksum: Some("9f86d081884c7d65".to_string()),
            last_error: None,
        },
    );
    registry.targets.insert(
        TargetId::ClaudeDesktop,
        TargetSettings {
            enabled: false,
            last_sync: None,
            last_sync_checksum: None,
            last_error: Some("disk full".to_string()),
        },
    );
    registry.preferences = Preferences {
        auto_sync_on_changes: false,
        status_refresh_interval: 120,
    };
    registry
}

fn unicode_registry() -> Registry {
    let mut registry = bare_registry();
    let mut server = ServerDefinition::new(
        ServerId::from("ノート-사전-服务"),
        "Notes with émojis & spéçïal chars: <>&\"'".to_string(),
        ServerSource::Local { path: "/opt/ノート".to_string() },
        Transport::Stdio {
            command: "/opt/ノート/run".to_string(),
            args: vec!["--lang".to_string(), "日本語・한국어・العربية".to_string()],
            env: HashMap::new(),
        },
    );
    server.description = Some("🚀".to_string());
    registry.servers = vec![server];
    registry
}

fn every_source_registry() -> Registry {
    let mut registry = bare_registry();
    let sources = vec![
        ServerSource::Npm { package: "@mcp/a".to_string(), version: None },
        ServerSource::Uvx { package: "mcp-b".to_string() },
        ServerSource::Local { path: "/opt/c".to_string() },
        ServerSource::Docker { image: "mcp/d:latest".to_string() },
        ServerSource::Remote { url: "https://e.example/sse".to_string() },
        ServerSource::Github { repo: "octo/f".to_string(), branch: Some("main".to_string()) },
    ];
    registry.servers = sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| {
            ServerDefinition::new(
                ServerId::from(format!("s{i}")),
                format!("S{i}"),
                source,
                Transport::Stdio {
                    command: "run".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                },
            )
        })
        .collect();
    registry
}

// ---------------------------------------------------------------------------
// Whole-document round trip
// ---------------------------------------------------------------------------

#[rstest]
#[case("bare", bare_registry())]
#[case("populated", populated_registry())]
#[case("unicode", unicode_registry())]
#[case("every_source", every_source_registry())]
fn document_round_trip(#[case] label: &str, #[case] registry: Registry) {
    let yaml = serde_yaml::to_string(&registry)
        .unwrap_or_else(|e| panic!("{label}: serialize failed: {e}"));
    let back: Registry = serde_yaml::from_str(&yaml)
        .unwrap_or_else(|e| panic!("{label}: deserialize failed: {e}"));
    assert_eq!(registry.version, back.version, "{label}: version");
    assert_eq!(registry.preferences, back.preferences, "{label}: preferences");
    assert_eq!(registry.targets, back.targets, "{label}: target settings");
    assert_eq!(registry.servers.len(), back.servers.len(), "{label}: server count");
    for (orig, got) in registry.servers.iter().zip(back.servers.iter()) {
        assert_eq!(orig.id, got.id, "{label}: server id");
        assert_eq!(orig.name, got.name, "{label}: server name");
        assert_eq!(orig.source, got.source, "{label}: server source");
        assert_eq!(orig.transport, got.transport, "{label}: server transport");
        assert_eq!(orig.enabled_targets, got.enabled_targets, "{label}: enabled targets");
        assert_eq!(orig.description, got.description, "{label}: description");
    }
}

// ---------------------------------------------------------------------------
// Target-id roundtrip (every variant)
// ---------------------------------------------------------------------------

#[rstest]
#[case(TargetId::ClaudeCode, "claude-code")]
#[case(TargetId::ClaudeDesktop, "claude-desktop")]
#[case(TargetId::Cursor, "cursor")]
#[case(TargetId::Vscode, "vscode")]
#[case(TargetId::Cline, "cline")]
#[case(TargetId::Continue, "continue")]
#[case(TargetId::Windsurf, "windsurf")]
#[case(TargetId::Warp, "warp")]
fn target_id_roundtrip(#[case] target: TargetId, #[case] expected: &str) {
    let yaml = serde_yaml::to_string(&target).expect("serialize");
    assert_eq!(yaml.trim(), expected);
    let back: TargetId = serde_yaml::from_str(expected).expect("deserialize");
    assert_eq!(back, target);
    assert_eq!(target.as_str(), expected);
}
