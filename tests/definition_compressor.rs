use serde_json::json;
use ultra_lean_mcp_proxy::compress::DefinitionCompressor;

#[test]
fn compresses_an_entire_tools_list_payload() {
    let mut tools = vec![
        json!({
            "name": "list_pull_requests",
            "description": "This tool enables users to retrieve repository information in order to list open pull requests",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repo": {"type": "string", "description": "This tool enables users to retrieve the repository identifier"}
                }
            }
        }),
        json!({"name": "ping", "description": "ping"}),
    ];

    DefinitionCompressor::compress_tools(&mut tools);

    let first_desc = tools[0]["description"].as_str().unwrap();
    assert!(first_desc.to_lowercase().contains("get repo info"), "got: {first_desc}");
    assert!(!first_desc.to_lowercase().contains("this tool enables"));

    // Below the minimum length floor, left untouched.
    assert_eq!(tools[1]["description"], json!("ping"));
}
