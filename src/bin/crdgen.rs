use aiven_operator::crd::render_crds;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", render_crds()?);
    Ok(())
}
