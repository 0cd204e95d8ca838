use axum::{response::Html, Router, routing::get};

pub fn router() -> Router {
    Router::new().route("/", get(index))
}

async fn index() -> Html<&'static str> {
    Html(r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Tabletalk - Data Analysis Agent</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 0; color: #1d1d1f; display: flex; min-height: 100vh; }
    aside { width: 320px; padding: 1.5rem; background: #f4f5f7; border-right: 1px solid #ddd; box-sizing: border-box; }
    main { flex: 1; padding: 1.5rem 2rem; max-width: 960px; }
    h1 { margin-top: 0; }
    label { display: block; margin-top: 0.75rem; font-weight: 600; }
    input[type=text], input[type=password], textarea { width: 100%; padding: 0.5rem; box-sizing: border-box; }
    button { margin-top: 0.75rem; padding: 0.5rem 1rem; }
    button:disabled { opacity: 0.5; }
    .status { margin-top: 0.5rem; font-size: 0.9rem; white-space: pre-wrap; }
    .error { color: #b00020; }
    .ok { color: #1b7f3b; }
    .info { color: #555; }
    table { border-collapse: collapse; font-size: 0.85rem; margin-top: 0.5rem; }
    th, td { border: 1px solid #ddd; padding: 0.25rem 0.5rem; text-align: right; }
    details { border: 1px solid #ddd; border-radius: 6px; padding: 0.5rem 1rem; margin-bottom: 0.75rem; }
    summary { cursor: pointer; font-weight: 600; }
    pre { background: #f6f8fa; padding: 0.75rem; overflow: auto; white-space: pre-wrap; }
    code.sample { display: block; background: #fff; margin: 0.25rem 0; padding: 0.25rem; cursor: pointer; }
    footer { margin-top: 2rem; font-size: 0.8rem; color: #666; }
  </style>
</head>
<body>
  <aside>
    <h2>Configuration</h2>
    <label for="apiKey">API key</label>
    <input id="apiKey" type="password" placeholder="Paste your provider API key" />
    <button id="saveKey">Save key</button>
    <div id="keyStatus" class="status info"></div>

    <label for="fileInput">Upload your CSV file</label>
    <input id="fileInput" type="file" accept=".csv,text/csv" />
    <div id="uploadStatus" class="status"></div>

    <h3>Agent configuration</h3>
    <label for="temperature">Temperature: <span id="temperatureValue"></span></label>
    <input id="temperature" type="range" min="0" max="1" step="0.05" />
    <label><input id="verbose" type="checkbox" /> Verbose mode</label>
    <button id="initAgent" disabled>Initialize agent</button>
    <div id="agentStatus" class="status"></div>

    <h3>Sample queries</h3>
    <code class="sample">What is the number of records?</code>
    <code class="sample">Show summary statistics for numeric columns</code>
    <code class="sample">Are there any missing values in the dataset?</code>
    <code class="sample">What are the unique values in [column_name]?</code>
    <code class="sample">Find correlations between [column_a] and [column_b]</code>

    <footer>Note: your API key is kept in server memory for this session only and is never stored permanently.</footer>
  </aside>

  <main>
    <h1>Data Analysis Agent</h1>
    <p class="info">Upload a CSV, provide an API key, then ask questions about your data in plain language.</p>

    <section id="datasetInfo"></section>
    <details id="rawData">
      <summary>Show raw data</summary>
      <div id="rawTable"></div>
      <button id="moreRows">Load more rows</button>
    </details>

    <section id="askSection" hidden>
      <h2>Ask questions about your data</h2>
      <textarea id="query" rows="4" placeholder="e.g. What is the average value of column X?"></textarea>
      <button id="runQuery">Run query</button>
      <div id="queryStatus" class="status"></div>
    </section>

    <section id="historySection"></section>
  </main>

  <script>
    let sessionId = null;
    let rawOffset = 0;
    const $ = (id) => document.getElementById(id);

    async function api(path, options = {}) {
      const res = await fetch(path, options);
      const text = await res.text();
      let body = null;
      try { body = text ? JSON.parse(text) : null; } catch (_) { body = text; }
      if (!res.ok) {
        throw new Error(body && body.error ? body.error : (text || res.statusText));
      }
      return body;
    }

    function setStatus(el, text, cls) {
      el.textContent = text;
      el.className = 'status ' + (cls || 'info');
    }

    const esc = (s) => String(s).replace(/[&<>]/g, (c) => ({ '&': '&amp;', '<': '&lt;', '>': '&gt;' }[c]));

    function renderTable(headers, rows, offset) {
      let html = '<table><tr><th></th>' + headers.map((h) => '<th>' + esc(h) + '</th>').join('') + '</tr>';
      rows.forEach((row, i) => {
        html += '<tr><td>' + (offset + i) + '</td>' + row.map((c) => '<td>' + esc(c) + '</td>').join('') + '</tr>';
      });
      return html + '</table>';
    }

    function renderAgent(agent) {
      const el = $('agentStatus');
      if (agent.status === 'ready') {
        setStatus(el, 'Agent ready (' + agent.config.model + ', temperature ' + agent.config.temperature + ')', 'ok');
      } else if (agent.status === 'failed') {
        setStatus(el, agent.error + '\nPlease check your API key and try again.', 'error');
      } else {
        setStatus(el, 'Waiting for: ' + agent.missing.join(', '), 'info');
      }
      $('askSection').hidden = agent.status !== 'ready';
    }

    async function refresh() {
      const s = await api('/api/sessions/' + sessionId);
      if (s.api_key) {
        setStatus($('keyStatus'), 'Key ' + s.api_key.masked + (s.api_key.source === 'environment' ? ' (server default)' : ''), 'ok');
      }
      $('temperature').value = s.agent_config.temperature;
      $('temperatureValue').textContent = s.agent_config.temperature;
      $('verbose').checked = s.agent_config.verbose;
      $('initAgent').disabled = !(s.api_key && s.dataset);
      renderAgent(s.agent);
      if (s.dataset) {
        const d = s.dataset;
        $('datasetInfo').innerHTML = '<h2>Dataset: ' + esc(d.name) + '</h2><p>Shape: (' + d.rows + ', ' + d.columns + ')</p>' +
          '<p>Columns: ' + d.schema.map((c) => esc(c.name) + ' <small>(' + c.kind + ')</small>').join(', ') + '</p><div id="preview"></div>';
        const page = await api('/api/sessions/' + sessionId + '/dataset/rows?limit=5');
        $('preview').innerHTML = renderTable(page.headers, page.rows, 0);
      }
      await renderHistory();
    }

    async function renderHistory() {
      const entries = await api('/api/sessions/' + sessionId + '/history');
      const section = $('historySection');
      if (!entries.length) { section.innerHTML = ''; return; }
      section.innerHTML = '<h2>Query history</h2>';
      entries.slice().reverse().forEach((entry, i) => {
        const details = document.createElement('details');
        details.open = i === 0;
        const summary = document.createElement('summary');
        summary.textContent = 'Query ' + entry.id + ': ' + entry.title;
        const q = document.createElement('pre');
        q.textContent = entry.query;
        const r = document.createElement('div');
        if (entry.status.state === 'pending') {
          r.className = 'status info';
          r.textContent = 'Processing...';
        } else if (entry.status.state === 'failed') {
          r.className = 'status error';
          r.textContent = 'Error: ' + entry.status.text;
        } else {
          r.className = 'status';
          r.textContent = entry.status.text;
        }
        details.append(summary, q, r);
        section.appendChild(details);
      });
    }

    $('saveKey').addEventListener('click', async () => {
      try {
        setStatus($('keyStatus'), 'Saving...');
        const agent = await api('/api/sessions/' + sessionId + '/api-key', {
          method: 'PUT',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ api_key: $('apiKey').value })
        });
        $('apiKey').value = '';
        renderAgent(agent);
        await refresh();
      } catch (e) { setStatus($('keyStatus'), e.message, 'error'); }
    });

    $('fileInput').addEventListener('change', async () => {
      const file = $('fileInput').files[0];
      if (!file) return;
      const form = new FormData();
      form.append('file', file);
      setStatus($('uploadStatus'), 'Uploading...');
      try {
        const res = await api('/api/sessions/' + sessionId + '/dataset', { method: 'POST', body: form });
        setStatus($('uploadStatus'), 'File uploaded successfully! Shape: (' + res.dataset.rows + ', ' + res.dataset.columns + ')', 'ok');
        rawOffset = 0;
        $('rawTable').innerHTML = '';
        await refresh();
      } catch (e) { setStatus($('uploadStatus'), e.message, 'error'); }
    });

    $('temperature').addEventListener('input', () => { $('temperatureValue').textContent = $('temperature').value; });

    $('initAgent').addEventListener('click', async () => {
      setStatus($('agentStatus'), 'Initializing the agent...');
      try {
        const agent = await api('/api/sessions/' + sessionId + '/agent', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ temperature: parseFloat($('temperature').value), verbose: $('verbose').checked })
        });
        renderAgent(agent);
      } catch (e) {
        setStatus($('agentStatus'), e.message + '\nPlease check your API key and try again.', 'error');
        $('askSection').hidden = true;
      }
    });

    $('runQuery').addEventListener('click', async () => {
      const query = $('query').value.trim();
      if (!query) { setStatus($('queryStatus'), 'Please enter a query first!', 'error'); return; }
      $('runQuery').disabled = true;
      setStatus($('queryStatus'), 'Processing your query...');
      const poll = setInterval(renderHistory, 1000);
      try {
        const entry = await api('/api/sessions/' + sessionId + '/queries', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ query })
        });
        if (entry.status.state === 'answered') {
          setStatus($('queryStatus'), 'Query processed successfully!', 'ok');
          $('query').value = '';
        } else {
          setStatus($('queryStatus'), 'Error processing query: ' + entry.status.text, 'error');
        }
      } catch (e) {
        setStatus($('queryStatus'), e.message, 'error');
      } finally {
        clearInterval(poll);
        $('runQuery').disabled = false;
        await renderHistory();
      }
    });

    $('moreRows').addEventListener('click', async () => {
      const page = await api('/api/sessions/' + sessionId + '/dataset/rows?offset=' + rawOffset + '&limit=100');
      $('rawTable').innerHTML += renderTable(page.headers, page.rows, page.offset);
      rawOffset = page.offset + page.rows.length;
      $('moreRows').disabled = rawOffset >= page.total_rows;
    });

    document.querySelectorAll('code.sample').forEach((el) => {
      el.addEventListener('click', () => { $('query').value = el.textContent; });
    });

    (async () => {
      sessionId = sessionStorage.getItem('tabletalk-session');
      if (sessionId) {
        try { await refresh(); return; } catch (_) { sessionId = null; }
      }
      const s = await api('/api/sessions', { method: 'POST' });
      sessionId = s.id;
      sessionStorage.setItem('tabletalk-session', sessionId);
      await refresh();
    })();
  </script>
</body>
</html>"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_index_serves_page() {
        let response = router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("/api/sessions"));
        assert!(html.contains("never stored permanently"));
        assert!(html.contains("catch (_) { body = text; }"));
    }
}
