use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn taskreg_help_works() {
    Command::cargo_bin("taskreg")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("task registry"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = ["init", "show", "chain", "check", "resolve"];

    for cmd in subcommands {
        Command::cargo_bin("taskreg")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}
