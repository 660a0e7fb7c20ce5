//! The stock LEMP service set (Debian/Ubuntu layout).

use std::collections::BTreeMap;

use crate::health::{CheckDef, CheckKind};

use super::spec::{PackageSpec, ServiceSpec, TemplateSource};

/// Database, PHP runtime and web server, in dependency order. Check
/// ports follow `default_params()`.
pub fn lemp_services() -> Vec<ServiceSpec> {
    let params = default_params();
    vec![
        mysql(template_port("mysql", &params).unwrap_or(3306)),
        php_fpm(template_port("php-fpm", &params).unwrap_or(9000)),
        nginx(template_port("nginx", &params).unwrap_or(80)),
    ]
}

/// The port the built-in template `name` listens on under `params`.
/// `None` for unknown templates, missing keys, or a php-fpm socket path.
pub fn template_port(name: &str, params: &BTreeMap<String, String>) -> Option<u16> {
    let value = match name {
        "mysql" => params.get("mysql_port")?.as_str(),
        "php-fpm" => params.get("php_fpm_listen")?.rsplit(':').next()?,
        "nginx" => params.get("listen_port")?.as_str(),
        _ => return None,
    };
    value.trim().parse().ok()
}

/// Global template parameters shared by the stock services.
pub fn default_params() -> BTreeMap<String, String> {
    [
        ("server_name", "localhost"),
        ("listen_port", "80"),
        ("document_root", "/var/www/html"),
        ("php_fpm_listen", "127.0.0.1:9000"),
        ("php_fpm_user", "www-data"),
        ("php_fpm_max_children", "5"),
        ("mysql_bind_address", "127.0.0.1"),
        ("mysql_port", "3306"),
        ("mysql_max_connections", "151"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn mysql(port: u16) -> ServiceSpec {
    ServiceSpec::new("mysql", PackageSpec::new("mysql-server"), "mysql")
        .with_template(TemplateSource::Builtin {
            name: "mysql".into(),
        })
        .with_config_path("/etc/mysql/conf.d/lempxpert.cnf")
        .with_validate_command("mysqld --defaults-extra-file={path} --validate-config")
        .with_check(CheckDef::new(
            "port",
            CheckKind::Tcp {
                host: "127.0.0.1".into(),
                port,
            },
        ))
        .with_check(CheckDef::new(
            "ping",
            CheckKind::MysqlPing {
                host: "127.0.0.1".into(),
                port,
            },
        ))
}

fn php_fpm(port: u16) -> ServiceSpec {
    ServiceSpec::new(
        "php-fpm",
        PackageSpec::new("php8.1-fpm").with_version("8.1"),
        "php8.1-fpm",
    )
    .with_template(TemplateSource::Builtin {
        name: "php-fpm".into(),
    })
    .with_config_path("/etc/php/8.1/fpm/pool.d/lempxpert.conf")
    .depends_on("mysql")
    .with_check(CheckDef::new(
        "port",
        CheckKind::Tcp {
            host: "127.0.0.1".into(),
            port,
        },
    ))
}

fn nginx(port: u16) -> ServiceSpec {
    ServiceSpec::new("nginx", PackageSpec::new("nginx"), "nginx")
        .with_template(TemplateSource::Builtin {
            name: "nginx".into(),
        })
        .with_config_path("/etc/nginx/nginx.conf")
        .with_validate_command("nginx -t -q -c {path}")
        .depends_on("php-fpm")
        .with_check(CheckDef::new(
            "port",
            CheckKind::Tcp {
                host: "127.0.0.1".into(),
                port,
            },
        ))
        .with_check(CheckDef::new(
            "http",
            CheckKind::Http {
                url: format!("http://127.0.0.1:{}/lempxpert-health", port),
                expected_status: 200,
            },
        ))
}
