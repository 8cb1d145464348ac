use civic_schema::{validate, FieldSchema, FieldType, ServiceDefinition, ServiceKind};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn producer_service() -> ServiceDefinition {
    ServiceDefinition::new(
        "Cadastro de Produtor Rural",
        "AGRICULTURA",
        ServiceKind::DataCollecting,
        Some("CADASTRO_PRODUTOR"),
    )
    .with_field(FieldSchema::new("nomePropriedade", "Nome da Propriedade", FieldType::Text).with_length(None, Some(120)))
    .with_field(FieldSchema::new("areaHectares", "Área (ha)", FieldType::Number).with_range(Some(0.1), Some(10_000.0)))
    .with_field(
        FieldSchema::new("culturas", "Culturas", FieldType::Multiselect)
            .with_options(["Milho", "Feijão", "Mandioca", "Café"]),
    )
    .with_field(FieldSchema::new("cnpjCooperativa", "CNPJ", FieldType::Cnpj))
    .with_field(FieldSchema::new("contato", "Contato", FieldType::Phone).with_pattern(r"^\(\d{2}\)"))
    .with_required(["nome", "cpf", "nomePropriedade", "areaHectares", "culturas"])
}

fn bench_validate(c: &mut Criterion) {
    let service = producer_service();
    let accepted = json!({
        "nome": "João da Silva",
        "cpf": "529.982.247-25",
        "nomePropriedade": "Sítio Boa Vista",
        "areaHectares": "12,5",
        "culturas": ["Milho", "Café"],
        "cnpjCooperativa": "11.222.333/0001-81",
        "contato": "(11) 98765-4321"
    });
    let rejected = json!({
        "nomePropriedade": "",
        "areaHectares": -3,
        "culturas": ["milho"],
        "cnpjCooperativa": "123",
        "contato": "98765"
    });

    c.bench_function("validate_accepted", |b| {
        b.iter(|| validate(black_box(&service), black_box(&accepted)))
    });
    c.bench_function("validate_rejected", |b| {
        b.iter(|| validate(black_box(&service), black_box(&rejected)))
    });
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
