//! Approval page rendering

use super::approval::PendingApproval;

const CHECKLIST: [&str; 6] = [
    "Tests cover happy path scenarios",
    "Tests cover edge cases",
    "Tests include error handling",
    "Tests are readable and maintainable",
    "Property-based tests included (if applicable)",
    "No obvious test gaming opportunities",
];

const STYLE: &str = r#"
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        max-width: 1200px;
        margin: 0 auto;
        padding: 20px;
        background-color: #f5f5f5;
    }
    .container { background: white; border-radius: 8px; padding: 30px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
    h1 { color: #333; }
    h2 { color: #666; margin-top: 30px; }
    .feature-desc { background: #f8f9fa; padding: 15px; border-radius: 4px; margin: 20px 0; }
    .code-block {
        background: #1e1e1e;
        color: #d4d4d4;
        padding: 20px;
        border-radius: 4px;
        overflow-x: auto;
        font-family: 'Monaco', 'Menlo', 'Ubuntu Mono', monospace;
        font-size: 14px;
        line-height: 1.5;
    }
    .checklist { background: #e8f4f8; padding: 20px; border-radius: 4px; margin: 20px 0; }
    .checklist label { display: block; margin: 10px 0; cursor: pointer; }
    .actions { margin-top: 30px; display: flex; gap: 20px; align-items: flex-start; }
    .feedback { flex: 1; }
    textarea { width: 100%; min-height: 100px; padding: 10px; border: 1px solid #ddd; border-radius: 4px; font-family: inherit; font-size: 14px; }
    button { padding: 12px 24px; border: none; border-radius: 4px; font-size: 16px; font-weight: 500; cursor: pointer; }
    .approve { background: #22c55e; color: white; }
    .approve:hover { background: #16a34a; }
    .reject { background: #ef4444; color: white; }
    .reject:hover { background: #dc2626; }
    .categories { display: flex; gap: 10px; flex-wrap: wrap; margin: 10px 0; }
    .category { background: #ddd; padding: 5px 10px; border-radius: 15px; font-size: 12px; }
"#;

/// Escape text for HTML element content and attribute values
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Full review page for one pending approval
pub fn render_approval_page(approval: &PendingApproval) -> String {
    let request = &approval.request;

    let categories: String = request
        .test_categories
        .iter()
        .map(|c| format!(r#"<span class="category">{}</span>"#, escape_html(c)))
        .collect();

    let checklist: String = CHECKLIST
        .iter()
        .map(|item| format!("<label><input type=\"checkbox\"> {}</label>\n", item))
        .collect();

    // The ID ends up inside a JS string literal; ours are ULIDs but escape anyway
    let id_js = serde_json::to_string(&approval.id).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>AI Rails TDD - Test Approval</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <h1>🧪 Test Approval Required</h1>

        <div class="feature-desc">
            <h3>Feature Description:</h3>
            <p>{feature}</p>
        </div>

        <div class="categories">
            <strong>Test Categories:</strong>
            {categories}
        </div>

        <h2>Generated Tests:</h2>
        <pre class="code-block">{tests}</pre>

        <div class="checklist">
            <h3>Review Checklist:</h3>
            {checklist}
        </div>

        <div class="actions">
            <div class="feedback">
                <h3>Feedback (optional for approval, required for rejection):</h3>
                <textarea id="feedback" placeholder="Enter your feedback here..."></textarea>
            </div>
        </div>

        <div class="actions" style="margin-top: 20px;">
            <button class="approve" onclick="submitDecision(true)">✅ Approve Tests</button>
            <button class="reject" onclick="submitDecision(false)">❌ Reject Tests</button>
        </div>
    </div>

    <script>
        const approvalId = {id_js};

        function escapeText(s) {{
            const div = document.createElement('div');
            div.textContent = s;
            return div.innerHTML;
        }}

        async function submitDecision(approved) {{
            const feedback = document.getElementById('feedback').value;

            if (!approved && !feedback.trim()) {{
                alert('Please provide feedback when rejecting tests');
                return;
            }}

            try {{
                const response = await fetch('/webhook/approval-response/' + encodeURIComponent(approvalId), {{
                    method: 'POST',
                    headers: {{ 'Content-Type': 'application/json' }},
                    body: JSON.stringify({{
                        approved: approved,
                        feedback: feedback || null,
                        reviewer: 'human'
                    }})
                }});

                if (response.ok) {{
                    document.body.innerHTML = `
                        <div class="container">
                            <h1>✅ Decision Submitted</h1>
                            <p>Your decision has been recorded.</p>
                            <p><strong>Status:</strong> ${{approved ? 'Approved' : 'Rejected'}}</p>
                            ${{feedback ? '<p><strong>Feedback:</strong> ' + escapeText(feedback) + '</p>' : ''}}
                            <p style="margin-top: 20px;">You can close this window.</p>
                        </div>
                    `;
                }} else {{
                    alert('Error submitting decision. Please try again.');
                }}
            }} catch (error) {{
                alert('Network error. Please check your connection.');
            }}
        }}
    </script>
</body>
</html>
"#,
        style = STYLE,
        feature = escape_html(&request.feature_description),
        categories = categories,
        tests = escape_html(&request.generated_tests),
        checklist = checklist,
        id_js = id_js,
    )
}
