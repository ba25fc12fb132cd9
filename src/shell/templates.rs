//! Embedded HTML templates for the Portico shell.
//!
//! All templates are defined as `&str` constants and rendered via minijinja.
//! Pages extend the shared layout; the layout renders the navigation chrome
//! only when the `chrome` flag is set, so focused pages (login, register,
//! error, and the role-gated work surfaces) stay chrome-free.

/// Base layout template. All pages extend this.
pub const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{% block title %}Portico{% endblock %}</title>
    <style>
        :root {
            --bg-primary: #0f1117;
            --bg-secondary: #1a1d27;
            --border: #2e3245;
            --text-primary: #e1e4ed;
            --text-secondary: #8b8fa3;
            --accent: #6366f1;
            --accent-hover: #818cf8;
            --danger: #ef4444;
            --radius: 8px;
        }
        *, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
            min-height: 100vh;
        }
        a { color: var(--accent); text-decoration: none; }
        a:hover { color: var(--accent-hover); }
        .navbar {
            background: var(--bg-secondary);
            border-bottom: 1px solid var(--border);
            padding: 0 1.5rem;
            display: flex;
            align-items: center;
            height: 56px;
        }
        .navbar-brand { font-weight: 700; margin-right: 2rem; color: var(--text-primary); }
        .navbar-brand span { color: var(--accent); }
        .nav-links { display: flex; gap: 0.25rem; flex: 1; }
        .nav-link {
            padding: 0.5rem 0.875rem;
            border-radius: var(--radius);
            color: var(--text-secondary);
            font-size: 0.875rem;
        }
        .nav-link:hover { color: var(--text-primary); }
        .nav-user { display: flex; align-items: center; gap: 0.5rem; font-size: 0.8125rem; color: var(--text-secondary); }
        .nav-user img { width: 28px; height: 28px; border-radius: 50%; }
        .logout-btn {
            background: none;
            border: none;
            color: var(--text-secondary);
            cursor: pointer;
            font-size: 0.8125rem;
        }
        .logout-btn:hover { color: var(--danger); }
        .container { max-width: 960px; margin: 0 auto; padding: 1.5rem; }
        .card {
            background: var(--bg-secondary);
            border: 1px solid var(--border);
            border-radius: var(--radius);
            padding: 1.25rem;
            max-width: 420px;
        }
        .form-group { margin-bottom: 1rem; }
        .form-group label { display: block; font-size: 0.8125rem; color: var(--text-secondary); margin-bottom: 0.25rem; }
        .form-group input {
            width: 100%;
            padding: 0.5rem 0.75rem;
            background: var(--bg-primary);
            border: 1px solid var(--border);
            border-radius: var(--radius);
            color: var(--text-primary);
        }
        .btn {
            padding: 0.5rem 1rem;
            background: var(--accent);
            border: none;
            border-radius: var(--radius);
            color: #fff;
            cursor: pointer;
        }
        .btn:hover { background: var(--accent-hover); }
        .error-banner {
            border: 1px solid var(--danger);
            border-radius: var(--radius);
            color: var(--danger);
            padding: 0.5rem 0.75rem;
            margin-bottom: 1rem;
            font-size: 0.875rem;
        }
    </style>
</head>
<body>
{% if chrome %}
    <nav class="navbar">
        <a class="navbar-brand" href="/">Port<span>ico</span></a>
        <div class="nav-links">
            {% if user %}
                <a class="nav-link" href="/account">Account</a>
                <a class="nav-link" href="/customer">Customer</a>
                {% if user.role == "admin" %}
                    <a class="nav-link" href="/admin">Admin</a>
                    <a class="nav-link" href="/agent">Agent</a>
                {% endif %}
            {% endif %}
        </div>
        <div class="nav-user">
            {% if user %}
                <img src="{{ user.avatar_url }}" alt="">
                <span>{{ user.display_name }}</span>
                <form method="post" action="/logout">
                    <button class="logout-btn" type="submit">Log out</button>
                </form>
            {% else %}
                <a class="nav-link" href="/login">Log in</a>
                <a class="nav-link" href="/register">Register</a>
            {% endif %}
        </div>
    </nav>
{% endif %}
    <main class="container">
        {% block content %}{% endblock %}
    </main>
</body>
</html>"#;

/// Public landing page.
pub const HOME: &str = r#"{% extends "layout" %}
{% block title %}Portico{% endblock %}
{% block content %}
<h1>Welcome</h1>
{% if user %}
<p>Signed in as {{ user.display_name }}.</p>
{% else %}
<p><a href="/login">Log in</a> or <a href="/register">register</a> to continue.</p>
{% endif %}
{% endblock %}"#;

/// Login form. Rendered with an optional `error` message on failure.
pub const LOGIN: &str = r#"{% extends "layout" %}
{% block title %}Log in - Portico{% endblock %}
{% block content %}
<div class="card">
    <h1>Log in</h1>
    {% if error %}<div class="error-banner">{{ error }}</div>{% endif %}
    <form method="post" action="/login">
        <div class="form-group">
            <label for="email">Email</label>
            <input id="email" name="email" type="email" value="{{ email | default('') }}">
        </div>
        <div class="form-group">
            <label for="password">Password</label>
            <input id="password" name="password" type="password">
        </div>
        <button class="btn" type="submit">Log in</button>
    </form>
    <p><a href="/register">Need an account?</a></p>
</div>
{% endblock %}"#;

/// Registration form. Same error contract as the login form.
pub const REGISTER: &str = r#"{% extends "layout" %}
{% block title %}Register - Portico{% endblock %}
{% block content %}
<div class="card">
    <h1>Register</h1>
    {% if error %}<div class="error-banner">{{ error }}</div>{% endif %}
    <form method="post" action="/register">
        <div class="form-group">
            <label for="name">Name</label>
            <input id="name" name="name" type="text" value="{{ name | default('') }}">
        </div>
        <div class="form-group">
            <label for="email">Email</label>
            <input id="email" name="email" type="email" value="{{ email | default('') }}">
        </div>
        <div class="form-group">
            <label for="password">Password</label>
            <input id="password" name="password" type="password">
        </div>
        <button class="btn" type="submit">Register</button>
    </form>
    <p><a href="/login">Already registered?</a></p>
</div>
{% endblock %}"#;

/// Account page for any authenticated identity.
pub const ACCOUNT: &str = r#"{% extends "layout" %}
{% block title %}Account - Portico{% endblock %}
{% block content %}
<h1>Your account</h1>
<div class="card">
    <p><img src="{{ user.avatar_url }}" alt="" width="48" height="48"></p>
    <p><strong>{{ user.display_name }}</strong></p>
    {% if user.email %}<p>{{ user.email }}</p>{% endif %}
    <p>Role: {{ user.role }}</p>
</div>
{% endblock %}"#;

/// Customer work surface, available to any authenticated identity.
pub const CUSTOMER: &str = r#"{% extends "layout" %}
{% block title %}Customer - Portico{% endblock %}
{% block content %}
<h1>Customer area</h1>
<p>Signed in as {{ user.display_name }} ({{ user.role }}).</p>
{% endblock %}"#;

/// Admin console landing page.
pub const ADMIN: &str = r#"{% extends "layout" %}
{% block title %}Admin - Portico{% endblock %}
{% block content %}
<h1>Admin console</h1>
<p>Signed in as {{ user.display_name }}.</p>
{% endblock %}"#;

/// Agent work surface, admin-gated like the console.
pub const AGENT: &str = r#"{% extends "layout" %}
{% block title %}Agent - Portico{% endblock %}
{% block content %}
<h1>Agent workspace</h1>
<p>Signed in as {{ user.display_name }}.</p>
{% endblock %}"#;

/// Generic error page, also the unauthorized-redirect target.
pub const ERROR: &str = r#"{% extends "layout" %}
{% block title %}Error - Portico{% endblock %}
{% block content %}
<div class="card">
    <h1>Something went wrong</h1>
    <p>You may not have access to that page.</p>
    <p><a href="/">Back to home</a></p>
</div>
{% endblock %}"#;
