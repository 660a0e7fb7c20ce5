//! Built-in config templates for the stock LEMP services.

const NGINX: &str = r#"# Managed by lempxpert. Local edits are overwritten on install.
user www-data;
worker_processes auto;
pid /run/nginx.pid;

events {
    worker_connections 768;
}

http {
    sendfile on;
    tcp_nopush on;
    types_hash_max_size 2048;
    server_tokens off;

    include /etc/nginx/mime.types;
    default_type application/octet-stream;

    access_log /var/log/nginx/access.log;
    error_log /var/log/nginx/error.log;

    server {
        listen {{ listen_port }} default_server;
        server_name {{ server_name }};
        root {{ document_root }};
        index index.php index.html;

        location = /lempxpert-health {
            access_log off;
            default_type text/plain;
            return 200 "ok";
        }

        location / {
            try_files $uri $uri/ =404;
        }

        location ~ \.php$ {
            include fastcgi_params;
            fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
            fastcgi_pass {{ php_fpm_listen }};
        }
    }
}
"#;

const PHP_FPM: &str = r#"; Managed by lempxpert. Local edits are overwritten on install.
[lempxpert]
user = {{ php_fpm_user }}
group = {{ php_fpm_user }}
listen = {{ php_fpm_listen }}
pm = dynamic
pm.max_children = {{ php_fpm_max_children }}
pm.start_servers = 2
pm.min_spare_servers = 1
pm.max_spare_servers = 3
"#;

const MYSQL: &str = r#"# Managed by lempxpert. Local edits are overwritten on install.
[mysqld]
bind-address = {{ mysql_bind_address }}
port = {{ mysql_port }}
max_connections = {{ mysql_max_connections }}
"#;

/// Look up a built-in template by name.
pub fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "nginx" => Some(NGINX),
        "php-fpm" => Some(PHP_FPM),
        "mysql" => Some(MYSQL),
        _ => None,
    }
}

/// Names of all built-in templates.
pub fn builtin_names() -> &'static [&'static str] {
    &["nginx", "php-fpm", "mysql"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        for name in builtin_names() {
            assert!(builtin(name).is_some(), "{}", name);
        }
        assert!(builtin("apache").is_none());
    }

    #[test]
    fn test_nginx_template_has_health_location() {
        assert!(builtin("nginx").unwrap().contains("/lempxpert-health"));
    }
}
