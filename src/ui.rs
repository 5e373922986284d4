//! Embedded HTML for the panel pages. Pages are plain const templates with
//! `{{PLACEHOLDER}}` substitution and inline vanilla JS talking to the JSON
//! API; there is no template engine and no separate asset pipeline.

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn message_banner(message: Option<&str>, class: &str) -> String {
    match message {
        Some(message) => format!(
            r#"<div class="banner {}">{}</div>"#,
            class,
            escape_html(message)
        ),
        None => String::new(),
    }
}

pub fn login_page(error: Option<&str>) -> String {
    LOGIN_HTML
        .replace("{{CSS}}", SHARED_CSS)
        .replace("<!-- MESSAGE -->", &message_banner(error, "error"))
}

pub fn setup_page(error: Option<&str>) -> String {
    SETUP_HTML
        .replace("{{CSS}}", SHARED_CSS)
        .replace("<!-- MESSAGE -->", &message_banner(error, "error"))
}

pub fn editor_page(username: &str, caddyfile: &str, notice: Option<&str>) -> String {
    EDITOR_HTML
        .replace("{{CSS}}", SHARED_CSS)
        .replace("{{USERNAME}}", &escape_html(username))
        .replace("{{CADDYFILE}}", &escape_html(caddyfile))
        .replace("<!-- MESSAGE -->", &message_banner(notice, "warning"))
}

pub fn stats_page(username: &str) -> String {
    STATS_HTML
        .replace("{{CSS}}", SHARED_CSS)
        .replace("{{USERNAME}}", &escape_html(username))
}

const SHARED_CSS: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        background: #10141f;
        color: #e8e8e8;
        min-height: 100vh;
    }
    .header {
        background: linear-gradient(135deg, #162032 0%, #1d2b42 100%);
        padding: 16px 28px;
        display: flex;
        justify-content: space-between;
        align-items: center;
        border-bottom: 1px solid rgba(255,255,255,0.08);
    }
    .header h1 { font-size: 20px; }
    .header h1 span { color: #3fb68b; }
    .nav a {
        color: #9aa7b8;
        text-decoration: none;
        margin-left: 18px;
    }
    .nav a:hover { color: #fff; }
    .nav a.logout { color: #ff6b6b; }
    .container { padding: 26px; max-width: 1200px; margin: 0 auto; }
    .banner {
        padding: 12px;
        border-radius: 8px;
        margin-bottom: 18px;
        text-align: center;
    }
    .banner.error { background: rgba(255,82,82,0.15); border: 1px solid #ff5252; color: #ff8a8a; }
    .banner.warning { background: rgba(255,183,77,0.12); border: 1px solid #ffb74d; color: #ffcf8a; }
    .banner.success { background: rgba(63,182,139,0.12); border: 1px solid #3fb68b; color: #7fd8b7; }
    button {
        padding: 10px 18px;
        background: linear-gradient(135deg, #2f9e77 0%, #3fb68b 100%);
        border: none;
        border-radius: 8px;
        color: #fff;
        font-size: 14px;
        font-weight: 600;
        cursor: pointer;
    }
    button.secondary { background: #2a3850; }
    button:hover { filter: brightness(1.1); }
    input[type="text"], input[type="password"] {
        width: 100%;
        padding: 11px 14px;
        border: 1px solid rgba(255,255,255,0.15);
        border-radius: 8px;
        background: rgba(255,255,255,0.06);
        color: #fff;
        font-size: 15px;
    }
    input:focus { outline: none; border-color: #3fb68b; }
    label { display: block; color: #9aa7b8; margin-bottom: 6px; font-size: 13px; }
    .form-group { margin-bottom: 18px; }
    table { width: 100%; border-collapse: collapse; }
    th, td {
        padding: 10px 12px;
        text-align: left;
        border-bottom: 1px solid rgba(255,255,255,0.06);
    }
    th { color: #9aa7b8; font-size: 12px; text-transform: uppercase; letter-spacing: 1px; }
    .card {
        background: rgba(255,255,255,0.04);
        border: 1px solid rgba(255,255,255,0.08);
        border-radius: 10px;
        padding: 18px;
        margin-bottom: 22px;
    }
    .card h2 { font-size: 15px; margin-bottom: 12px; color: #c6d0dc; }
"#;

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>CaddyPanel - Login</title>
    <style>{{CSS}}
        .auth-box { max-width: 380px; margin: 12vh auto 0; padding: 36px; }
        .auth-box h1 { text-align: center; margin-bottom: 6px; }
        .auth-box p { text-align: center; color: #9aa7b8; margin-bottom: 26px; font-size: 14px; }
        .auth-box button { width: 100%; }
    </style>
</head>
<body>
    <div class="card auth-box">
        <h1>Caddy<span style="color:#3fb68b">Panel</span></h1>
        <p>Reverse proxy administration</p>
        <!-- MESSAGE -->
        <form method="POST" action="/login">
            <div class="form-group">
                <label for="username">Username</label>
                <input type="text" id="username" name="username" required autocomplete="username">
            </div>
            <div class="form-group">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" required autocomplete="current-password">
            </div>
            <button type="submit">Sign In</button>
        </form>
    </div>
</body>
</html>"#;

const SETUP_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>CaddyPanel - Setup</title>
    <style>{{CSS}}
        .auth-box { max-width: 420px; margin: 10vh auto 0; padding: 36px; }
        .auth-box h1 { text-align: center; margin-bottom: 6px; }
        .auth-box p { text-align: center; color: #9aa7b8; margin-bottom: 26px; font-size: 14px; }
        .auth-box button { width: 100%; }
    </style>
</head>
<body>
    <div class="card auth-box">
        <h1>Administrator Setup</h1>
        <p>Create the panel's admin account. This can only be done once.</p>
        <!-- MESSAGE -->
        <form method="POST" action="/setup">
            <div class="form-group">
                <label for="username">Username</label>
                <input type="text" id="username" name="username" required>
            </div>
            <div class="form-group">
                <label for="password">Password (min. 8 characters)</label>
                <input type="password" id="password" name="password" required minlength="8">
            </div>
            <div class="form-group">
                <label for="confirm_password">Confirm Password</label>
                <input type="password" id="confirm_password" name="confirm_password" required minlength="8">
            </div>
            <button type="submit">Create Account</button>
        </form>
    </div>
</body>
</html>"#;

const EDITOR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>CaddyPanel - Caddyfile</title>
    <style>{{CSS}}
        textarea {
            width: 100%;
            min-height: 420px;
            background: #0b0f18;
            color: #d7e0ea;
            border: 1px solid rgba(255,255,255,0.12);
            border-radius: 8px;
            padding: 14px;
            font-family: 'Monaco', 'Menlo', monospace;
            font-size: 13px;
            resize: vertical;
        }
        .toolbar { display: flex; gap: 10px; margin: 14px 0; flex-wrap: wrap; }
        #browser li { list-style: none; padding: 4px 0; cursor: pointer; color: #9ecdf2; }
        #browser li:hover { text-decoration: underline; }
        #status { margin-left: auto; align-self: center; color: #9aa7b8; font-size: 13px; }
    </style>
</head>
<body>
    <div class="header">
        <h1>Caddy<span>Panel</span></h1>
        <div class="nav">
            <span>&#128100; {{USERNAME}}</span>
            <a href="/stats">Stats</a>
            <a href="/logout" class="logout">Logout</a>
        </div>
    </div>
    <div class="container">
        <!-- MESSAGE -->
        <div class="card">
            <h2>Caddyfile</h2>
            <textarea id="caddyfile" spellcheck="false">{{CADDYFILE}}</textarea>
            <div class="toolbar">
                <button onclick="saveCaddyfile()">Save</button>
                <button class="secondary" onclick="reloadCaddy()">Reload Caddy</button>
                <button class="secondary" onclick="configureLogging()">Enable JSON Logging</button>
                <span id="status"></span>
            </div>
        </div>
        <div class="card">
            <h2>Browse Files</h2>
            <div id="browser-path" style="color:#9aa7b8; font-size:13px; margin-bottom:8px;">.</div>
            <ul id="browser"></ul>
        </div>
    </div>
    <script>
        const status = document.getElementById('status');

        function setStatus(msg, ok) {
            status.textContent = msg;
            status.style.color = ok ? '#7fd8b7' : '#ff8a8a';
        }

        async function saveCaddyfile() {
            const content = document.getElementById('caddyfile').value;
            const resp = await fetch('/api/caddyfile/save', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ content }),
            });
            const data = await resp.json();
            setStatus(data.message, resp.ok && data.status === 'success');
        }

        async function reloadCaddy() {
            setStatus('Reloading...', true);
            const resp = await fetch('/api/caddy/reload', { method: 'POST' });
            const data = await resp.json();
            setStatus(data.message + (data.details ? ' ' + data.details : ''), data.status === 'success');
        }

        async function configureLogging() {
            const resp = await fetch('/api/caddyfile/configure_logging', { method: 'POST' });
            const data = await resp.json();
            setStatus(data.message, data.status === 'success');
            if (data.status !== 'error') location.reload();
        }

        async function browse(path) {
            const resp = await fetch('/api/browse?path=' + encodeURIComponent(path));
            if (!resp.ok) return;
            const data = await resp.json();
            document.getElementById('browser-path').textContent = data.current_path;
            const list = document.getElementById('browser');
            list.innerHTML = '';
            if (data.parent_path !== null) {
                const up = document.createElement('li');
                up.textContent = '⬆ ..';
                up.onclick = () => browse(data.parent_path || '.');
                list.appendChild(up);
            }
            for (const item of data.items) {
                const li = document.createElement('li');
                li.textContent = (item.is_dir ? '📁 ' : '📄 ') + item.name;
                li.onclick = () => item.is_dir ? browse(item.path) : openFile(item.path);
                list.appendChild(li);
            }
        }

        async function openFile(path) {
            const resp = await fetch('/api/readfile?path=' + encodeURIComponent(path));
            const data = await resp.json();
            if (data.status === 'success') {
                document.getElementById('caddyfile').value = data.content;
                setStatus('Loaded ' + data.path + ' (view only; Save writes the Caddyfile)', true);
            } else {
                setStatus(data.message, false);
            }
        }

        browse('.');
    </script>
</body>
</html>"#;

const STATS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>CaddyPanel - Traffic Stats</title>
    <style>{{CSS}}
        .stats-grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(170px, 1fr));
            gap: 16px;
            margin-bottom: 22px;
        }
        .stat-card h3 {
            color: #9aa7b8;
            font-size: 11px;
            text-transform: uppercase;
            letter-spacing: 1px;
            margin-bottom: 8px;
        }
        .stat-card .value { font-size: 26px; font-weight: 700; color: #3fb68b; }
        .grid-2 { display: grid; grid-template-columns: 1fr 1fr; gap: 22px; }
        .bar-row { display: flex; align-items: center; gap: 8px; font-size: 12px; padding: 2px 0; }
        .bar-row .label { width: 110px; color: #9aa7b8; white-space: nowrap; }
        .bar-row .bar { background: #3fb68b; height: 10px; border-radius: 3px; }
        #range { color: #9aa7b8; font-size: 13px; margin-bottom: 16px; }
    </style>
</head>
<body>
    <div class="header">
        <h1>Caddy<span>Panel</span> &middot; Traffic</h1>
        <div class="nav">
            <span>&#128100; {{USERNAME}}</span>
            <a href="/">Caddyfile</a>
            <a href="/logout" class="logout">Logout</a>
        </div>
    </div>
    <div class="container">
        <div id="advisory"></div>
        <div id="range"></div>
        <div class="stats-grid">
            <div class="card stat-card"><h3>Total Requests</h3><div class="value" id="total">-</div></div>
            <div class="card stat-card"><h3>Avg Response Time</h3><div class="value" id="avg-ms">-</div></div>
            <div class="card stat-card"><h3>Avg Response Size</h3><div class="value" id="avg-kb">-</div></div>
            <div class="card stat-card"><h3>Error Rate</h3><div class="value" id="error-rate">-</div></div>
        </div>
        <div class="card">
            <h2>Requests over time (10 min buckets, UTC)</h2>
            <div id="timeseries"></div>
        </div>
        <div class="grid-2">
            <div class="card">
                <h2>Status Codes</h2>
                <table><tbody id="status-dist"></tbody></table>
            </div>
            <div class="card">
                <h2>Top Hosts</h2>
                <table><tbody id="hosts"></tbody></table>
            </div>
            <div class="card">
                <h2>Top Paths</h2>
                <table><tbody id="paths"></tbody></table>
            </div>
            <div class="card">
                <h2>Top User Agents</h2>
                <table><tbody id="agents"></tbody></table>
            </div>
        </div>
    </div>
    <script>
        function fillTable(id, rows, keyField) {
            const tbody = document.getElementById(id);
            tbody.innerHTML = '';
            for (const row of rows) {
                const tr = document.createElement('tr');
                const name = document.createElement('td');
                name.textContent = row[keyField];
                const count = document.createElement('td');
                count.textContent = row.count;
                tr.append(name, count);
                tbody.appendChild(tr);
            }
        }

        async function refresh() {
            const resp = await fetch('/api/stats/global');
            if (!resp.ok) return;
            const data = await resp.json();

            const advisory = document.getElementById('advisory');
            advisory.innerHTML = '';
            if (data.log_read_error) {
                const div = document.createElement('div');
                div.className = 'banner warning';
                div.textContent = data.log_read_error;
                advisory.appendChild(div);
            }

            document.getElementById('total').textContent = data.total_requests;
            document.getElementById('avg-ms').textContent = data.avg_response_time_ms.toFixed(1) + 'ms';
            document.getElementById('avg-kb').textContent = data.avg_response_size_kb.toFixed(1) + 'KB';
            document.getElementById('error-rate').textContent = data.error_rate_percent.toFixed(2) + '%';
            document.getElementById('range').textContent = data.data_from_utc
                ? 'Data from ' + data.data_from_utc + ' to ' + data.data_to_utc
                : 'No data yet';

            const dist = document.getElementById('status-dist');
            dist.innerHTML = '';
            for (const bucket of ['1xx', '2xx', '3xx', '4xx', '5xx', 'other']) {
                const tr = document.createElement('tr');
                const name = document.createElement('td');
                name.textContent = bucket;
                const count = document.createElement('td');
                count.textContent = data.status_codes_dist[bucket];
                tr.append(name, count);
                dist.appendChild(tr);
            }

            fillTable('hosts', data.requests_by_host, 'host');
            fillTable('paths', data.top_paths, 'path');
            fillTable('agents', data.top_user_agents, 'agent');

            const series = document.getElementById('timeseries');
            series.innerHTML = '';
            const max = Math.max(1, ...data.requests_timeseries.map(p => p.count));
            for (const point of data.requests_timeseries) {
                const row = document.createElement('div');
                row.className = 'bar-row';
                const label = document.createElement('span');
                label.className = 'label';
                label.textContent = point.time;
                const bar = document.createElement('span');
                bar.className = 'bar';
                bar.style.width = (point.count / max * 100).toFixed(1) + '%';
                const count = document.createElement('span');
                count.textContent = point.count;
                row.append(label, bar, count);
                series.appendChild(row);
            }
        }

        refresh();
        setInterval(refresh, 30000);
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_page_escapes_caddyfile_content() {
        let page = editor_page("admin", "<script>alert(1)</script>", None);
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(page.contains("admin"));
    }

    #[test]
    fn banners_only_render_when_present() {
        let clean = login_page(None);
        assert!(!clean.contains("class=\"banner"));
        let with_error = login_page(Some("Invalid username or password."));
        assert!(with_error.contains("Invalid username or password."));
        assert!(with_error.contains("banner error"));
    }
}
