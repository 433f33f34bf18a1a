use crate::store::{FleetSnapshot, LoginActivity};
use crate::types::{ConnectionState, EntityStatus, ManagedEntity};

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn status_label(status: EntityStatus) -> &'static str {
    match status {
        EntityStatus::OnlineLoggedIn => "In use",
        EntityStatus::OnlineLocked => "Locked",
        EntityStatus::Offline => "Offline",
    }
}

fn connection_label(state: ConnectionState) -> (&'static str, &'static str) {
    match state {
        ConnectionState::Connected => ("connected", "🟢 Connected"),
        ConnectionState::Connecting => ("connecting", "🟡 Connecting..."),
        ConnectionState::Disconnected => ("disconnected", "🔴 Disconnected"),
    }
}

fn entity_row(entity: &ManagedEntity) -> String {
    let session = entity.session.as_ref();
    let username = session.map(|s| escape_html(&s.username)).unwrap_or_default();
    let organization = session
        .and_then(|s| s.organization.as_deref())
        .map(escape_html)
        .unwrap_or_default();
    let login_time = session
        .and_then(|s| s.login_time)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let ip_address = entity
        .network
        .as_ref()
        .and_then(|n| n.ip_address.as_deref())
        .map(escape_html)
        .unwrap_or_default();
    let id = escape_html(&entity.id);

    let action = if entity.status == EntityStatus::OnlineLoggedIn {
        // The id only ever reaches script through the dataset, never as source text
        format!(
            r#"<button class="btn btn-danger" data-pc-id="{}" onclick="forceLogout(this.dataset.pcId)">🚪 Force Logout</button>"#,
            id
        )
    } else {
        String::new()
    };

    format!(
        r#"
                <tr>
                    <td>{}</td>
                    <td><span class="status {}">{}</span></td>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{}</td>
                    <td class="actions">{}</td>
                </tr>"#,
        id,
        entity.status.as_str(),
        status_label(entity.status),
        username,
        organization,
        login_time,
        ip_address,
        action
    )
}

fn activity_item(activity: &LoginActivity) -> String {
    let organization = activity
        .organization
        .as_deref()
        .map(|o| format!(" ({})", escape_html(o)))
        .unwrap_or_default();
    format!(
        r#"
                <li><strong>{}</strong>{} logged in on PC {} at {}</li>"#,
        escape_html(&activity.username),
        organization,
        escape_html(&activity.pc_id),
        activity.login_time.format("%H:%M:%S")
    )
}

/// Overview page: connection indicator, stat cards, PC table, recent logins
pub fn generate_index_html(
    snapshot: &FleetSnapshot,
    activity: &[LoginActivity],
    connection: ConnectionState,
) -> String {
    let stats = &snapshot.stats;
    let (connection_class, connection_text) = connection_label(connection);

    let rows: String = snapshot.sorted_by_id().into_iter().map(entity_row).collect();
    let activity_items: String = activity.iter().map(activity_item).collect();

    format!(
        r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>PC Fleet Admin</title>
    <style>
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f5f5f5; }}
        .container {{ max-width: 100%; margin: 0 auto; padding: 20px 40px; }}
        .header {{ background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px 0; text-align: center; margin-bottom: 30px; }}
        .connection {{ display: inline-block; margin-top: 10px; padding: 4px 12px; border-radius: 20px; background: rgba(255,255,255,0.2); }}
        .cards {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr)); gap: 20px; margin-bottom: 30px; }}
        .card {{ background: white; border-radius: 12px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); padding: 20px; text-align: center; }}
        .card .value {{ font-size: 32px; font-weight: 700; color: #374151; }}
        .card .share {{ font-size: 12px; color: #6b7280; }}
        .panel {{ background: white; border-radius: 12px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); padding: 30px; margin-bottom: 30px; }}
        table {{ width: 100%; border-collapse: collapse; margin-top: 20px; }}
        th, td {{ padding: 12px; text-align: left; border-bottom: 1px solid #e1e5e9; }}
        th {{ background: #f8f9fa; font-weight: 600; color: #374151; }}
        .status {{ padding: 6px 12px; border-radius: 20px; font-size: 12px; font-weight: 600; }}
        .status.logged_in {{ background: #c6f6d5; color: #22543d; }}
        .status.locked {{ background: #fefcbf; color: #744210; }}
        .status.offline {{ background: #fed7d7; color: #742a2a; }}
        .btn {{ color: white; border: none; padding: 8px 16px; border-radius: 6px; cursor: pointer; font-size: 14px; }}
        .btn-danger {{ background: #e53e3e; }}
        .btn-danger:hover {{ background: #c53030; }}
        ul {{ list-style: none; }}
        li {{ padding: 8px 0; border-bottom: 1px solid #e1e5e9; }}
        h2 {{ color: #374151; margin-bottom: 10px; }}
    </style>
</head>
<body>
    <div class="header">
        <div class="container">
            <h1>🖥️ PC Fleet Admin</h1>
            <span class="connection {}">{}</span>
        </div>
    </div>

    <div class="container">
        <div class="cards">
            <div class="card"><div class="value">{}</div><div>Total PCs</div></div>
            <div class="card"><div class="value">{}</div><div>Online</div><div class="share">{}%</div></div>
            <div class="card"><div class="value">{}</div><div>In use</div><div class="share">{}%</div></div>
            <div class="card"><div class="value">{}</div><div>Locked</div><div class="share">{}%</div></div>
            <div class="card"><div class="value">{}</div><div>Offline</div><div class="share">{}%</div></div>
        </div>

        <div class="panel">
            <h2>PCs ({} total)</h2>
            {}
            <table>
                <thead>
                    <tr>
                        <th>PC</th>
                        <th>Status</th>
                        <th>User</th>
                        <th>Organization</th>
                        <th>Login Time</th>
                        <th>IP Address</th>
                        <th>Actions</th>
                    </tr>
                </thead>
                <tbody>{}
                </tbody>
            </table>
        </div>

        <div class="panel">
            <h2>Recent Logins</h2>
            <ul>{}
            </ul>
        </div>
    </div>

    <script>
        async function forceLogout(pcId) {{
            if (!confirm('Force logout PC ' + pcId + '?')) {{
                return;
            }}
            const response = await fetch('/api/fleet/' + encodeURIComponent(pcId) + '/force-logout', {{
                method: 'POST'
            }});
            const result = await response.json();
            if (!result.success) {{
                alert('Force logout failed: ' + result.message);
            }}
            setTimeout(() => window.location.reload(), 1000);
        }}

        // Auto-refresh every 10 seconds
        setTimeout(() => {{
            window.location.reload();
        }}, 10000);
    </script>
</body>
</html>
        "#,
        connection_class,
        connection_text,
        stats.total_count,
        stats.online_count,
        stats.share(stats.online_count),
        stats.logged_in_count,
        stats.share(stats.logged_in_count),
        stats.locked_count,
        stats.share(stats.locked_count),
        stats.offline_count,
        stats.share(stats.offline_count),
        snapshot.entities.len(),
        if snapshot.entities.is_empty() {
            "<p>No PCs reported yet.</p>"
        } else {
            ""
        },
        rows,
        activity_items
    )
}
